//! API 列表文本的来源：远程推荐列表（进程内缓存）与本地 `apis.txt`。

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use super::http_client::{HttpClient, HttpError};
use crate::endpoint::ApiSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("推荐API加载失败: {0}")]
    Remote(#[from] HttpError),
    #[error("本地API加载失败 {path}: {source}")]
    Local { path: PathBuf, source: io::Error },
}

pub struct EndpointSources {
    http: HttpClient,
    recommended_url: String,
    local_file: PathBuf,
    recommended_cache: Mutex<Option<String>>,
}

impl EndpointSources {
    pub fn new(http: HttpClient, recommended_url: impl Into<String>, local_file: PathBuf) -> Self {
        Self {
            http,
            recommended_url: recommended_url.into(),
            local_file,
            recommended_cache: Mutex::new(None),
        }
    }

    pub fn load(&self, source: ApiSource) -> Result<String, SourceError> {
        match source {
            ApiSource::Recommended => self.load_recommended(),
            ApiSource::Local => self.load_local(),
        }
    }

    /// 远程列表只拉取一次；失败不缓存，下次加载时重试。
    fn load_recommended(&self) -> Result<String, SourceError> {
        let mut cache = self
            .recommended_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(text) = cache.as_ref() {
            debug!("使用已缓存的推荐API列表");
            return Ok(text.clone());
        }
        let text = self.http.get_text(&self.recommended_url)?;
        info!("推荐API列表下载完成: {}", self.recommended_url);
        *cache = Some(text.clone());
        Ok(text)
    }

    /// 本地列表不存在时创建空文件。
    fn load_local(&self) -> Result<String, SourceError> {
        let path = &self.local_file;
        let local_err = |source| SourceError::Local {
            path: path.clone(),
            source,
        };
        if !path.exists() {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(local_err)?;
            }
            fs::write(path, "").map_err(local_err)?;
            info!("本地API文件不存在，已创建: {}", path.display());
            return Ok(String::new());
        }
        fs::read_to_string(path).map_err(local_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestServer, test_http_settings};
    use axum::Router;
    use axum::routing::get;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn missing_local_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists").join("apis.txt");
        let http = HttpClient::new(test_http_settings()).unwrap();
        let sources = EndpointSources::new(http, "http://127.0.0.1:9/unused", path.clone());

        assert_eq!(sources.load(ApiSource::Local).unwrap(), "");
        assert!(path.exists());

        fs::write(&path, "a: https://a/img\n").unwrap();
        assert_eq!(sources.load(ApiSource::Local).unwrap(), "a: https://a/img\n");
    }

    #[test]
    fn recommended_list_is_fetched_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/apis.txt",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "cat: https://cat/img\n" }
            }),
        );
        let server = TestServer::spawn(router);
        let dir = tempfile::tempdir().unwrap();
        let http = HttpClient::new(test_http_settings()).unwrap();
        let sources = EndpointSources::new(
            http,
            server.url("/apis.txt"),
            dir.path().join("apis.txt"),
        );

        for _ in 0..3 {
            assert_eq!(
                sources.load(ApiSource::Recommended).unwrap(),
                "cat: https://cat/img\n"
            );
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_remote_fetch_is_an_error() {
        let server = TestServer::spawn(Router::new());
        let dir = tempfile::tempdir().unwrap();
        let http = HttpClient::new(test_http_settings()).unwrap();
        let sources = EndpointSources::new(
            http,
            server.url("/missing.txt"),
            dir.path().join("apis.txt"),
        );
        assert!(matches!(
            sources.load(ApiSource::Recommended),
            Err(SourceError::Remote(_))
        ));
    }
}
