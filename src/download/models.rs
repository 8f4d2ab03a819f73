//! 下载相关的数据模型定义。
//!
//! 包含当前下载任务、任务状态、预加载条目与下载结果。

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
    Success,
    Failed,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DownloadStatus::Idle => "空闲",
            DownloadStatus::Downloading => "下载中",
            DownloadStatus::Success => "下载成功",
            DownloadStatus::Failed => "下载失败",
        };
        f.write_str(text)
    }
}

/// 当前（唯一的）下载任务；新下载开始时整体替换，不保留历史。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub save_path: Option<PathBuf>,
    pub status: DownloadStatus,
    pub error_message: String,
    pub api_name: String,
    pub progress: u8,
    pub total_size: u64,
}

impl DownloadTask {
    pub fn downloading(url: &str, api_name: &str) -> Self {
        Self {
            url: url.to_string(),
            status: DownloadStatus::Downloading,
            api_name: api_name.to_string(),
            ..Default::default()
        }
    }

    pub fn failed(url: &str, api_name: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status: DownloadStatus::Failed,
            error_message: message.into(),
            api_name: api_name.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn succeed(&mut self, save_path: PathBuf) {
        self.status = DownloadStatus::Success;
        self.save_path = Some(save_path);
        self.progress = 100;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = DownloadStatus::Failed;
        self.error_message = message.into();
    }
}

/// 已解析好的图片地址及其来源端点，FIFO 消费，至多使用一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadEntry {
    pub url: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub save_path: PathBuf,
    pub endpoint: String,
}

/// 预加载池 / 名称缓存的当前长度（状态展示与测试用）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    pub preloaded: usize,
    pub cached_names: usize,
}
