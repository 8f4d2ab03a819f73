use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::debug;

use crate::base_system::context::Config;

const MAX_REDIRECTS: usize = 10;
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("创建 HTTP 客户端失败: {0}")]
    Build(#[source] reqwest::Error),
    #[error("GET请求失败: {url}, 错误: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET请求失败: {url}, 状态码: {status}")]
    Status { url: String, status: StatusCode },
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub disable_proxy: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Some(Duration::from_millis(3050)),
            max_retries: 3,
            retry_backoff: Duration::from_millis(300),
            disable_proxy: false,
        }
    }
}

impl HttpSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.request_timeout.max(1)),
            connect_timeout: ms_from_connect_timeout_secs(cfg.min_connect_timeout)
                .map(Duration::from_millis),
            max_retries: cfg.max_retries,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
            disable_proxy: cfg.disable_proxy,
        }
    }
}

pub(crate) fn ms_from_connect_timeout_secs(v: f64) -> Option<u64> {
    if v <= 0.0 {
        return None;
    }
    let ms = (v * 1000.0).round() as i64;
    if ms <= 0 { None } else { Some(ms as u64) }
}

/// 共享的阻塞 HTTP 客户端：统一超时、请求头、重定向与瞬时错误重试。
///
/// `Client` 内部是引用计数的连接池，克隆开销很小，解析器/下载器各持一份即可。
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    settings: HttpSettings,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> Result<Self, HttpError> {
        // reqwest 未启用 gzip 解码，要求 identity 编码以便直接使用响应字节。
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "image/avif,image/webp,image/*,application/json,text/html;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36",
            ),
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS));
        if let Some(connect) = settings.connect_timeout {
            builder = builder.connect_timeout(connect);
        }
        if settings.disable_proxy {
            builder = builder.no_proxy();
        }

        let client = builder.build().map_err(HttpError::Build)?;
        Ok(Self { client, settings })
    }

    /// 发送 GET 请求；非 2xx 视为错误。429/5xx 与连接失败按指数退避重试，超时不重试。
    pub fn get(&self, url: &str) -> Result<Response, HttpError> {
        let mut attempt = 0u32;
        loop {
            debug!("发送GET请求: {}", url);
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!("GET请求成功: {}, 状态码: {}", url, status.as_u16());
                        return Ok(resp);
                    }
                    if is_retryable(status) && attempt < self.settings.max_retries {
                        debug!("GET请求返回 {}，第 {} 次重试: {}", status, attempt + 1, url);
                        self.sleep_backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(HttpError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(source) => {
                    if source.is_connect() && attempt < self.settings.max_retries {
                        debug!("连接失败，第 {} 次重试: {} ({})", attempt + 1, url, source);
                        self.sleep_backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(HttpError::Request {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }

    /// 读取完整文本响应。
    pub fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let resp = self.get(url)?;
        resp.text().map_err(|source| HttpError::Request {
            url: url.to_string(),
            source,
        })
    }

    fn sleep_backoff(&self, attempt: u32) {
        let factor = 1u32.checked_shl(attempt.min(10)).unwrap_or(u32::MAX);
        let wait = self.settings.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF);
        std::thread::sleep(wait);
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}
