//! API 端点：列表解析、注册表与加权抽取。
//!
//! 子模块：
//! - `models`：EndpointRecord / ApiSource / EndpointOverride
//! - `parser`：行格式解析与权重归一化
//! - `registry`：带读写锁的端点列表
//! - `selector`：按权重随机抽取

pub mod models;
pub mod parser;
pub mod registry;
pub mod selector;

pub use models::{ApiSource, EndpointOverride, EndpointRecord};
pub use registry::EndpointRegistry;
