//! 后台预加载工作池。
//!
//! 固定数量的工作线程等待 `DownloadService` 发出的补充请求；`shutdown` 置位取消标志、
//! 断开停止通道并等待所有线程退出。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;
use tracing::{debug, error, info};

use super::service::DownloadService;

const MAX_WORKERS: usize = 8;

pub struct PreloadWorkers {
    stop_tx: Option<channel::Sender<()>>,
    cancel: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl PreloadWorkers {
    pub fn start(service: Arc<DownloadService>, workers: usize) -> Self {
        let workers = workers.clamp(1, MAX_WORKERS);
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let cancel = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let service = Arc::clone(&service);
            let trigger = service.refill_receiver();
            let stop_rx = stop_rx.clone();
            let cancel = Arc::clone(&cancel);

            let spawned = thread::Builder::new()
                .name(format!("preload-{idx}"))
                .spawn(move || {
                    loop {
                        channel::select! {
                            recv(trigger) -> msg => {
                                if msg.is_err() || cancel.load(Ordering::Relaxed) {
                                    break;
                                }
                                service.preload_refill(&cancel);
                            }
                            recv(stop_rx) -> _ => break,
                        }
                    }
                    debug!(target: "preload", "预加载线程退出");
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => error!(target: "preload", "无法启动预加载线程: {}", err),
            }
        }
        info!(target: "preload", "预加载线程已启动: {} 个", handles.len());

        Self {
            stop_tx: Some(stop_tx),
            cancel,
            handles,
        }
    }

    /// 供退出钩子使用：置位后进行中的补充会在下一次网络请求前停止。
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn shutdown(&mut self) {
        if self.stop_tx.is_none() {
            return;
        }
        self.cancel.store(true, Ordering::Relaxed);
        self.stop_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!(target: "preload", "预加载线程已全部停止");
    }
}

impl Drop for PreloadWorkers {
    fn drop(&mut self) {
        self.shutdown();
    }
}
