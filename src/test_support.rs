//! 测试用本地 HTTP 服务：axum 路由跑在独立线程的 tokio 运行时上，测试线程用阻塞客户端访问。

use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::Router;
use tokio::sync::oneshot;

use crate::third_party::http_client::HttpSettings;

pub(crate) struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub(crate) fn spawn(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        listener
            .set_nonblocking(true)
            .expect("set test listener nonblocking");
        let addr = listener.local_addr().expect("test listener addr");
        let (tx, rx) = oneshot::channel::<()>();

        let handle = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("test runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        let _ = rx.await;
                    })
                    .await
                    .expect("test server");
            });
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// 短超时、极短退避、忽略系统代理。
pub(crate) fn test_http_settings() -> HttpSettings {
    HttpSettings {
        timeout: Duration::from_secs(5),
        connect_timeout: Some(Duration::from_secs(2)),
        max_retries: 2,
        retry_backoff: Duration::from_millis(5),
        disable_proxy: true,
    }
}

/// 超时很短的客户端设置，配合故意拖延的路由测试超时。
pub(crate) fn short_timeout_settings() -> HttpSettings {
    HttpSettings {
        timeout: Duration::from_millis(300),
        max_retries: 0,
        ..test_http_settings()
    }
}
