//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（DownloadTask / PreloadEntry 等）
//! - `resolver`：端点响应 → 图片地址
//! - `transfer`：图片字节下载与文件命名
//! - `service`：下载主流程编排、预加载池与端点缓存
//! - `preload`：后台预加载工作池
//! - `progress`：CLI 进度条

pub mod models;
pub(crate) mod progress;
pub mod preload;
pub mod resolver;
pub mod service;
pub mod transfer;

pub use models::{DownloadOutcome, DownloadStatus, DownloadTask, PoolSnapshot, PreloadEntry};
pub use preload::PreloadWorkers;
pub use service::{DownloadError, DownloadService, PoolLimits};
