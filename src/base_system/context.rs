//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};
use crate::endpoint::{ApiSource, EndpointOverride};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // API 配置
    #[serde(default)]
    pub api_source: ApiSource,
    #[serde(default = "default_recommended_api_url")]
    pub recommended_api_url: String,
    #[serde(default = "default_local_api_file")]
    pub local_api_file: String,

    // 保存配置
    #[serde(default = "default_save_path")]
    pub save_path: String,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_min_connect_timeout")]
    pub min_connect_timeout: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_false")]
    pub disable_proxy: bool,

    // 预加载配置
    #[serde(default = "default_preload_size")]
    pub preload_size: usize,
    #[serde(default = "default_endpoint_cache_size")]
    pub endpoint_cache_size: usize,
    #[serde(default = "default_preload_workers")]
    pub preload_workers: usize,

    // 每个端点的用户设置（键为 `{name}_{line_number}`）
    #[serde(default)]
    pub recommended_apis: BTreeMap<String, EndpointOverride>,
    #[serde(default)]
    pub local_apis: BTreeMap<String, EndpointOverride>,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_source: ApiSource::default(),
            recommended_api_url: default_recommended_api_url(),
            local_api_file: default_local_api_file(),
            save_path: default_save_path(),
            request_timeout: default_request_timeout(),
            min_connect_timeout: default_min_connect_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            disable_proxy: default_false(),
            preload_size: default_preload_size(),
            endpoint_cache_size: default_endpoint_cache_size(),
            preload_workers: default_preload_workers(),
            recommended_apis: BTreeMap::new(),
            local_apis: BTreeMap::new(),
            base_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 14] = [
            FieldMeta {
                name: "api_source",
                description: "API来源, 可选: [recommended, local]",
            },
            FieldMeta {
                name: "recommended_api_url",
                description: "推荐API列表地址",
            },
            FieldMeta {
                name: "local_api_file",
                description: "本地API列表文件（相对数据目录）\n格式: [!] [名称:] URL [{描述}] [|权重|]，# 之后为注释",
            },
            FieldMeta {
                name: "save_path",
                description: "图片保存路径",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "min_connect_timeout",
                description: "最小连接超时时间（秒）",
            },
            FieldMeta {
                name: "max_retries",
                description: "遇到 429/5xx 或连接失败时的最大重试次数",
            },
            FieldMeta {
                name: "retry_backoff_ms",
                description: "重试退避基准时间, 单位ms（按次数翻倍）",
            },
            FieldMeta {
                name: "disable_proxy",
                description: "是否忽略系统代理设置",
            },
            FieldMeta {
                name: "preload_size",
                description: "预加载图片地址数量",
            },
            FieldMeta {
                name: "endpoint_cache_size",
                description: "预选API名称缓存数量",
            },
            FieldMeta {
                name: "preload_workers",
                description: "后台预加载线程数",
            },
            FieldMeta {
                name: "recommended_apis",
                description: "推荐API的用户设置（权重/参数/启用），由程序维护",
            },
            FieldMeta {
                name: "local_apis",
                description: "本地API的用户设置（权重/参数/启用），由程序维护",
            },
        ];
        &FIELDS
    }
}

impl Config {
    /// 记录数据目录；相对路径的文件都以它为基准。
    pub fn with_base_dir(mut self, base_dir: Option<&Path>) -> Self {
        self.base_dir = base_dir.map(Path::to_path_buf);
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.resolve(Self::FILE_NAME)
    }

    pub fn download_dir(&self) -> PathBuf {
        let raw = if self.save_path.trim().is_empty() {
            default_save_path()
        } else {
            self.save_path.trim().to_string()
        };
        self.resolve(&raw)
    }

    pub fn local_api_path(&self) -> PathBuf {
        let raw = if self.local_api_file.trim().is_empty() {
            default_local_api_file()
        } else {
            self.local_api_file.trim().to_string()
        };
        self.resolve(&raw)
    }

    pub fn overrides_for(&self, source: ApiSource) -> &BTreeMap<String, EndpointOverride> {
        match source {
            ApiSource::Recommended => &self.recommended_apis,
            ApiSource::Local => &self.local_apis,
        }
    }

    pub fn set_overrides(&mut self, source: ApiSource, saved: BTreeMap<String, EndpointOverride>) {
        match source {
            ApiSource::Recommended => self.recommended_apis = saved,
            ApiSource::Local => self.local_apis = saved,
        }
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

fn default_false() -> bool {
    false
}

fn default_recommended_api_url() -> String {
    "https://gitee.com/yxxawa/gg/raw/master/apis.txt".to_string()
}

fn default_local_api_file() -> String {
    "apis.txt".to_string()
}

fn default_save_path() -> String {
    "Download".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_min_connect_timeout() -> f64 {
    3.05
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    300
}

fn default_preload_size() -> usize {
    3
}

fn default_endpoint_cache_size() -> usize {
    5
}

fn default_preload_workers() -> usize {
    2
}
