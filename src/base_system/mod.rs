//! 基础设施：配置读写、全局配置结构与日志。

pub mod config;
pub mod context;
pub mod logging;
