//! 图片字节下载：流式分块写盘，按块回调进度，文件名取时间戳，冲突时追加 4 位随机后缀。

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use reqwest::Url;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};

use crate::third_party::http_client::{HttpClient, HttpError};

const CHUNK_SIZE: usize = 8192;
const DEFAULT_EXTENSION: &str = ".jpg";
const NAME_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("读取图片数据失败: {0}")]
    Read(#[source] io::Error),
    #[error("写入文件失败 {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("无法在 {0} 下生成不重复的文件名")]
    NoFreeName(PathBuf),
}

/// 进度回调：`(百分比, 总字节数)`。
pub type ProgressFn<'a> = &'a mut dyn FnMut(u8, u64);

pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str, dest_dir: &Path, progress: ProgressFn<'_>)
    -> Result<PathBuf, TransferError>;
}

pub struct HttpFetcher {
    http: HttpClient,
}

impl HttpFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, TransferError> {
        let mut resp = self.http.get(url)?;
        let total = resp.content_length().unwrap_or(0);

        fs::create_dir_all(dest_dir).map_err(|source| TransferError::Io {
            path: dest_dir.to_path_buf(),
            source,
        })?;
        let (path, file) = create_unique_file(dest_dir, &timestamp_stem(), &file_extension(url))?;
        debug!("开始写入 {} (总大小 {} 字节)", path.display(), total);

        if let Err(err) = stream_to_file(&mut resp, file, &path, total, progress) {
            let _ = fs::remove_file(&path);
            return Err(err);
        }
        progress(100, total);
        info!("图片下载成功: {}", path.display());
        Ok(path)
    }
}

fn stream_to_file(
    reader: &mut dyn Read,
    file: File,
    path: &Path,
    total: u64,
    progress: ProgressFn<'_>,
) -> Result<u64, TransferError> {
    let write_err = |source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(file);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut done = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransferError::Read(err)),
        };
        writer.write_all(&buf[..n]).map_err(write_err)?;
        done += n as u64;
        if total > 0 {
            let pct = (done.saturating_mul(100) / total).min(100) as u8;
            progress(pct, total);
        }
    }
    writer.flush().map_err(write_err)?;
    Ok(done)
}

fn timestamp_stem() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// 从 URL 路径推断扩展名；识别不了时退回 `.jpg`。
pub(crate) fn file_extension(url: &str) -> String {
    let ext = Url::parse(url).ok().and_then(|u| {
        let last = u.path().rsplit('/').next()?.to_string();
        let (_, ext) = last.rsplit_once('.')?;
        let valid = (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then(|| format!(".{}", ext.to_ascii_lowercase()))
    });
    ext.unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// 以 `create_new` 独占创建文件；同名已存在时改用 `{stem}_{1000..=9999}{ext}`。
pub(crate) fn create_unique_file(
    dir: &Path,
    stem: &str,
    ext: &str,
) -> Result<(PathBuf, File), TransferError> {
    let mut rng = rand::rng();
    let mut candidate = dir.join(format!("{stem}{ext}"));
    for _ in 0..NAME_ATTEMPTS {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let suffix: u16 = rng.random_range(1000..=9999);
                candidate = dir.join(format!("{stem}_{suffix}{ext}"));
            }
            Err(source) => {
                return Err(TransferError::Io {
                    path: candidate,
                    source,
                });
            }
        }
    }
    Err(TransferError::NoFreeName(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestServer, short_timeout_settings, test_http_settings};
    use axum::Router;
    use axum::http::header;
    use axum::routing::get;
    use std::time::Duration;

    #[test]
    fn extension_comes_from_the_url_path() {
        assert_eq!(file_extension("https://cdn/a/b/cat.PNG?x=1.gif"), ".png");
        assert_eq!(file_extension("https://cdn/a/pic.webp"), ".webp");
        assert_eq!(file_extension("https://cdn/a/random"), ".jpg");
        assert_eq!(file_extension("https://cdn.example.com/"), ".jpg");
        assert_eq!(file_extension("https://cdn/a/file.tar-gz"), ".jpg");
        assert_eq!(file_extension("not a url"), ".jpg");
    }

    #[test]
    fn colliding_names_get_a_random_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_unique_file(dir.path(), "20260101_120000", ".png").unwrap();
        let (second, _) = create_unique_file(dir.path(), "20260101_120000", ".png").unwrap();

        assert_eq!(first.file_name().unwrap(), "20260101_120000.png");
        let name = second.file_name().unwrap().to_string_lossy().to_string();
        assert_ne!(second, first);
        let suffix = name
            .strip_prefix("20260101_120000_")
            .and_then(|s| s.strip_suffix(".png"))
            .expect("suffixed name");
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    fn server() -> TestServer {
        let router = Router::new()
            .route(
                "/img/big.png",
                get(|| async {
                    ([(header::CONTENT_TYPE, "image/png")], vec![7u8; 3 * CHUNK_SIZE + 17])
                }),
            )
            .route(
                "/img/slow.png",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                    ([(header::CONTENT_TYPE, "image/png")], vec![7u8; 16])
                }),
            );
        TestServer::spawn(router)
    }

    #[test]
    fn streams_bytes_to_disk_with_progress() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(HttpClient::new(test_http_settings()).unwrap());

        let mut seen = Vec::new();
        let path = fetcher
            .fetch(&server.url("/img/big.png"), dir.path(), &mut |pct, total| {
                seen.push((pct, total))
            })
            .unwrap();

        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(fs::read(&path).unwrap().len(), 3 * CHUNK_SIZE + 17);
        assert_eq!(seen.last(), Some(&(100, (3 * CHUNK_SIZE + 17) as u64)));
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn http_failure_leaves_no_file_behind() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(HttpClient::new(test_http_settings()).unwrap());

        let err = fetcher
            .fetch(&server.url("/img/missing.png"), dir.path(), &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(err, TransferError::Http(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn timeout_is_an_http_error_and_leaves_no_file() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(HttpClient::new(short_timeout_settings()).unwrap());

        let err = fetcher
            .fetch(&server.url("/img/slow.png"), dir.path(), &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(err, TransferError::Http(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
