//! 第三方服务访问：HTTP 客户端与 API 列表来源。

pub mod endpoint_source;
pub mod http_client;
