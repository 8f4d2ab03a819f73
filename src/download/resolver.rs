//! 从端点响应中提取最终的图片地址。
//!
//! 依次尝试：图片直链 → JSON 字段 → URL 扩展名 → HTML `<img src>`，首个命中即返回。
//! 网络错误、超时与非 2xx 均记为解析失败（`None`），由调用方换下一个端点。

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::endpoint::EndpointRecord;
use crate::third_party::http_client::HttpClient;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
const TOP_LEVEL_KEYS: [&str; 3] = ["url", "image", "img"];

/// 端点 → 图片地址。前台下载与后台预加载共用。
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, record: &EndpointRecord) -> Option<String>;
}

pub struct HttpResolver {
    http: HttpClient,
}

impl HttpResolver {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl EndpointResolver for HttpResolver {
    fn resolve(&self, record: &EndpointRecord) -> Option<String> {
        let request_url = record.request_url();
        let resp = match self.http.get(&request_url) {
            Ok(resp) => resp,
            Err(err) => {
                warn!(target: "resolver", "获取图片URL失败 [{}]: {}", record.name, err);
                return None;
            }
        };

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = match ContentKind::classify(&content_type) {
            ContentKind::Image | ContentKind::Other => String::new(),
            ContentKind::Json | ContentKind::Html => resp.text().unwrap_or_else(|err| {
                debug!(target: "resolver", "读取响应正文失败 [{}]: {}", record.name, err);
                String::new()
            }),
        };

        let found = extract_image_url(&content_type, &final_url, &request_url, &body);
        match &found {
            Some(url) => debug!(target: "resolver", "[{}] 解析到图片: {}", record.name, url),
            None => warn!(
                target: "resolver",
                "[{}] 无法从响应中提取图片URL (Content-Type: {})", record.name, content_type
            ),
        }
        found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Image,
    Json,
    Html,
    Other,
}

impl ContentKind {
    fn classify(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("image/") {
            ContentKind::Image
        } else if ct.contains("json") {
            ContentKind::Json
        } else if ct.contains("html") {
            ContentKind::Html
        } else {
            ContentKind::Other
        }
    }
}

/// 纯函数形式的提取策略，便于脱离网络测试。
pub(crate) fn extract_image_url(
    content_type: &str,
    final_url: &str,
    request_url: &str,
    body: &str,
) -> Option<String> {
    let kind = ContentKind::classify(content_type);
    if kind == ContentKind::Image {
        return Some(final_url.to_string());
    }
    if kind == ContentKind::Json
        && let Some(url) = url_from_json(body)
    {
        return Some(url);
    }
    if looks_like_image_url(final_url) {
        return Some(final_url.to_string());
    }
    if kind == ContentKind::Html {
        return scrape_img_src(body, request_url);
    }
    None
}

fn url_from_json(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let Value::Object(root) = value else {
        return None;
    };
    match root.get("data") {
        Some(data) => url_from_data(data),
        None => TOP_LEVEL_KEYS
            .iter()
            .find_map(|key| root.get(*key).and_then(non_empty_str)),
    }
}

fn url_from_data(data: &Value) -> Option<String> {
    match data {
        Value::String(_) => non_empty_str(data),
        Value::Object(map) => url_from_object(map),
        Value::Array(items) => match items.first() {
            Some(Value::Object(map)) => url_from_object(map),
            _ => None,
        },
        _ => None,
    }
}

fn url_from_object(map: &Map<String, Value>) -> Option<String> {
    map.get("url").and_then(non_empty_str).or_else(|| {
        map.get("urls")
            .and_then(|urls| urls.get("original"))
            .and_then(non_empty_str)
    })
}

fn non_empty_str(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn looks_like_image_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

fn re_img_src() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn scrape_img_src(html: &str, request_url: &str) -> Option<String> {
    let src = re_img_src().captures(html)?.get(1)?.as_str().trim();
    if src.starts_with("http://") || src.starts_with("https://") {
        return Some(src.to_string());
    }
    let base = Url::parse(request_url).ok()?;
    base.join(src).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ApiSource;
    use crate::test_support::{TestServer, short_timeout_settings, test_http_settings};
    use std::time::{Duration, Instant};
    use axum::Router;
    use axum::extract::RawQuery;
    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::get;

    const JSON: &str = "application/json; charset=utf-8";

    #[test]
    fn json_data_object_url() {
        let body = r#"{"data":{"url":"http://a/b.png"}}"#;
        assert_eq!(
            extract_image_url("application/json", "http://api/x", "http://api/x", body),
            Some("http://a/b.png".to_string())
        );
    }

    #[test]
    fn json_data_variants() {
        let cases = [
            (r#"{"success":true,"data":"https://img/1.jpg"}"#, "https://img/1.jpg"),
            (r#"{"data":{"urls":{"original":" https://img/2.png "}}}"#, "https://img/2.png"),
            (r#"{"data":[{"urls":{"original":"https://img/3.webp"}},{"url":"x"}]}"#, "https://img/3.webp"),
            (r#"{"data":[{"url":"https://img/4.gif"}]}"#, "https://img/4.gif"),
            (r#"{"image":"https://img/5.jpg"}"#, "https://img/5.jpg"),
            (r#"{"img":"https://img/6.jpg","code":200}"#, "https://img/6.jpg"),
            (r#"{"url":"https://img/7.jpg","image":"https://img/other.jpg"}"#, "https://img/7.jpg"),
        ];
        for (body, expected) in cases {
            assert_eq!(
                extract_image_url(JSON, "http://api/x", "http://api/x", body).as_deref(),
                Some(expected),
                "body: {body}"
            );
        }
    }

    #[test]
    fn data_field_shadows_top_level_keys() {
        let body = r#"{"data":{"id":3},"url":"https://img/top.jpg"}"#;
        assert_eq!(extract_image_url(JSON, "http://api/x", "http://api/x", body), None);
    }

    #[test]
    fn json_mismatch_falls_through_to_extension() {
        let body = r#"{"data":[]}"#;
        assert_eq!(
            extract_image_url(JSON, "http://cdn/pic.PNG?x=1", "http://api/x", body),
            Some("http://cdn/pic.PNG?x=1".to_string())
        );
        assert_eq!(
            extract_image_url(JSON, "http://cdn/pic", "http://api/x", "not json"),
            None
        );
    }

    #[test]
    fn image_content_type_returns_final_url() {
        assert_eq!(
            extract_image_url("image/jpeg", "http://cdn/abc", "http://api/x", ""),
            Some("http://cdn/abc".to_string())
        );
    }

    #[test]
    fn html_img_src_is_resolved_against_request_url() {
        let html = r#"<html><body><p>hi</p><IMG class="pic" src='/files/a.jpg'><img src="b.png"></body></html>"#;
        assert_eq!(
            extract_image_url("text/html", "http://site/page", "http://site/gallery/index?r=1", html),
            Some("http://site/files/a.jpg".to_string())
        );

        let html = r#"<img alt="x" src="https://cdn/abs.gif">"#;
        assert_eq!(
            extract_image_url("text/html; charset=utf-8", "http://site/page", "http://site/", html),
            Some("https://cdn/abs.gif".to_string())
        );

        let html = r#"<img alt="x" src="c.png">"#;
        assert_eq!(
            extract_image_url("text/html", "http://site/page", "http://site/gallery/", html),
            Some("http://site/gallery/c.png".to_string())
        );
    }

    #[test]
    fn unknown_content_yields_none() {
        assert_eq!(
            extract_image_url("text/plain", "http://api/x", "http://api/x", "hello"),
            None
        );
        assert_eq!(extract_image_url("text/html", "http://api/x", "http://api/x", "<p>no</p>"), None);
    }

    fn record(url: String, params: &str) -> EndpointRecord {
        EndpointRecord {
            name: "test".to_string(),
            url,
            weight: 100,
            description: String::new(),
            enabled: true,
            supports_params: !params.is_empty(),
            params: params.to_string(),
            source: ApiSource::Local,
            line_number: 1,
        }
    }

    fn server() -> TestServer {
        let router = Router::new()
            .route("/random", get(|| async { Redirect::temporary("/img/cat.png") }))
            .route(
                "/img/cat.png",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0x89u8, b'P', b'N', b'G']) }),
            )
            .route(
                "/api",
                get(|RawQuery(query): RawQuery| async move {
                    let q = query.unwrap_or_default().replace('=', "-");
                    (
                        [(header::CONTENT_TYPE, "application/json")],
                        format!(r#"{{"code":200,"data":{{"url":"https://cdn/{q}.jpg"}}}}"#),
                    )
                }),
            )
            .route(
                "/page",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "text/html")],
                        r#"<div><img width=10 src="/img/cat.png"></div>"#,
                    )
                }),
            )
            .route(
                "/broken",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                    Redirect::temporary("/img/cat.png")
                }),
            );
        TestServer::spawn(router)
    }

    #[test]
    fn resolves_over_http() {
        let server = server();
        let resolver = HttpResolver::new(HttpClient::new(test_http_settings()).unwrap());

        assert_eq!(
            resolver.resolve(&record(server.url("/random"), "")),
            Some(server.url("/img/cat.png"))
        );
        assert_eq!(
            resolver.resolve(&record(server.url("/api"), "size=big")),
            Some("https://cdn/size-big.jpg".to_string())
        );
        assert_eq!(
            resolver.resolve(&record(server.url("/page"), "")),
            Some(server.url("/img/cat.png"))
        );
    }

    #[test]
    fn failures_surface_as_none() {
        let server = server();
        let resolver = HttpResolver::new(HttpClient::new(test_http_settings()).unwrap());

        assert_eq!(resolver.resolve(&record(server.url("/broken"), "")), None);
        assert_eq!(resolver.resolve(&record(server.url("/nowhere"), "")), None);
        assert_eq!(
            resolver.resolve(&record("http://127.0.0.1:1/refused".to_string(), "")),
            None
        );
    }

    #[test]
    fn timeout_counts_as_unresolved() {
        let server = server();
        let resolver = HttpResolver::new(HttpClient::new(short_timeout_settings()).unwrap());

        let started = Instant::now();
        assert_eq!(resolver.resolve(&record(server.url("/slow"), "")), None);
        assert!(started.elapsed() < Duration::from_millis(1400));
        assert_eq!(
            resolver.resolve(&record(server.url("/random"), "")),
            Some(server.url("/img/cat.png"))
        );
    }
}
