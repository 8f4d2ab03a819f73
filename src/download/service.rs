//! 下载主流程编排。
//!
//! `DownloadService` 持有当前任务、预加载池与端点名称缓存，全部放在同一把锁里；
//! 锁只在修改状态的瞬间持有，网络请求与写盘期间一律不持锁。

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel as channel;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::models::{
    DownloadOutcome, DownloadStatus, DownloadTask, PoolSnapshot, PreloadEntry,
};
use super::resolver::EndpointResolver;
use super::transfer::{ImageFetcher, ProgressFn, TransferError};
use crate::base_system::context::Config;
use crate::endpoint::{EndpointRecord, EndpointRegistry};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("已有下载任务正在进行，请稍后再试")]
    Busy,
    #[error("没有可用的API，请检查API列表或启用状态")]
    NoEndpoint,
    #[error("所有API均无法获取图片URL")]
    Unresolved,
    #[error("图片下载失败: {0}")]
    Transfer(#[from] TransferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub preload_size: usize,
    pub name_cache_size: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            preload_size: 3,
            name_cache_size: 5,
        }
    }
}

impl PoolLimits {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            preload_size: cfg.preload_size,
            name_cache_size: cfg.endpoint_cache_size,
        }
    }
}

#[derive(Debug, Default)]
struct DownloadState {
    current_task: Option<DownloadTask>,
    preload_pool: VecDeque<PreloadEntry>,
    name_cache: VecDeque<String>,
    is_downloading: bool,
    // 切换来源时递增；进行中的补充任务据此丢弃旧来源的结果
    generation: u64,
}

pub struct DownloadService {
    registry: Arc<EndpointRegistry>,
    resolver: Arc<dyn EndpointResolver>,
    fetcher: Arc<dyn ImageFetcher>,
    save_dir: PathBuf,
    limits: PoolLimits,
    state: Mutex<DownloadState>,
    refill_tx: channel::Sender<()>,
    refill_rx: channel::Receiver<()>,
}

impl DownloadService {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        resolver: Arc<dyn EndpointResolver>,
        fetcher: Arc<dyn ImageFetcher>,
        save_dir: PathBuf,
        limits: PoolLimits,
    ) -> Self {
        // 容量 1：已有待处理的补充请求时，新请求直接合并
        let (refill_tx, refill_rx) = channel::bounded(1);
        Self {
            registry,
            resolver,
            fetcher,
            save_dir,
            limits,
            state: Mutex::new(DownloadState::default()),
            refill_tx,
            refill_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DownloadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub(crate) fn refill_receiver(&self) -> channel::Receiver<()> {
        self.refill_rx.clone()
    }

    pub fn current_status(&self) -> DownloadStatus {
        self.lock()
            .current_task
            .as_ref()
            .map(|t| t.status)
            .unwrap_or_default()
    }

    pub fn current_task(&self) -> Option<DownloadTask> {
        self.lock().current_task.clone()
    }

    pub fn is_downloading(&self) -> bool {
        self.lock().is_downloading
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            preloaded: state.preload_pool.len(),
            cached_names: state.name_cache.len(),
        }
    }

    /// 切换来源后清空两个池，进行中的补充结果也会被丢弃。
    pub fn reset_pools(&self) {
        let mut state = self.lock();
        state.preload_pool.clear();
        state.name_cache.clear();
        state.generation += 1;
        debug!(target: "preload", "预加载池已清空");
    }

    /// 请求一次后台补充；已有待处理请求时直接合并，不阻塞调用方。
    pub fn schedule_preload(&self) {
        match self.refill_tx.try_send(()) {
            Ok(()) => debug!(target: "preload", "已安排预加载任务"),
            Err(channel::TrySendError::Full(())) => {
                debug!(target: "preload", "已有待处理的预加载任务")
            }
            Err(channel::TrySendError::Disconnected(())) => {}
        }
    }

    /// 下载一张随机图片。
    ///
    /// `on_endpoint` 在每次确定使用某个端点时立即回调（含回退时的每一个端点），
    /// `on_progress` 在已知总大小时按块回调 `(百分比, 总字节数)`。
    pub fn request_download(
        &self,
        on_progress: ProgressFn<'_>,
        on_endpoint: &mut dyn FnMut(&str),
    ) -> Result<DownloadOutcome, DownloadError> {
        let guard = self.begin()?;
        let result = self.run_download(on_progress, on_endpoint);
        drop(guard);
        self.schedule_preload();
        result
    }

    fn begin(&self) -> Result<BusyGuard<'_>, DownloadError> {
        let mut state = self.lock();
        if state.is_downloading {
            warn!("已有下载任务正在进行");
            return Err(DownloadError::Busy);
        }
        state.is_downloading = true;
        Ok(BusyGuard { service: self })
    }

    fn run_download(
        &self,
        on_progress: ProgressFn<'_>,
        on_endpoint: &mut dyn FnMut(&str),
    ) -> Result<DownloadOutcome, DownloadError> {
        let (url, endpoint) = match self.acquire_image_url(on_endpoint) {
            Ok(found) => found,
            Err(err) => {
                error!("{}", err);
                self.lock().current_task = Some(DownloadTask::failed("", "", err.to_string()));
                return Err(err);
            }
        };

        info!("开始下载图片: {} (API: {})", url, endpoint);
        self.lock().current_task = Some(DownloadTask::downloading(&url, &endpoint));

        let mut report = |pct: u8, total: u64| {
            if let Some(task) = self.lock().current_task.as_mut() {
                task.progress = pct;
                task.total_size = total;
            }
            on_progress(pct, total);
        };

        match self.fetcher.fetch(&url, &self.save_dir, &mut report) {
            Ok(save_path) => {
                if let Some(task) = self.lock().current_task.as_mut() {
                    task.succeed(save_path.clone());
                }
                Ok(DownloadOutcome {
                    save_path,
                    endpoint,
                })
            }
            Err(err) => {
                error!("图片下载失败 [{}]: {}", endpoint, err);
                if let Some(task) = self.lock().current_task.as_mut() {
                    task.fail(err.to_string());
                }
                Err(err.into())
            }
        }
    }

    /// 预加载池 → 名称缓存 / 加权抽取 → 剩余缓存 → 全量扫描，返回 `(图片地址, 端点名)`。
    fn acquire_image_url(
        &self,
        on_endpoint: &mut dyn FnMut(&str),
    ) -> Result<(String, String), DownloadError> {
        let preloaded = self.lock().preload_pool.pop_front();
        if let Some(entry) = preloaded {
            debug!(target: "preload", "使用预加载的图片: {}", entry.url);
            on_endpoint(&entry.endpoint);
            return Ok((entry.url, entry.endpoint));
        }

        let mut tried = HashSet::new();
        let first = self
            .pop_cached_record()
            .or_else(|| self.registry.pick_random())
            .ok_or(DownloadError::NoEndpoint)?;
        if let Some(url) = self.try_endpoint(&first, &mut tried, on_endpoint) {
            return Ok((url, first.name));
        }

        while let Some(record) = self.pop_cached_record() {
            if tried.contains(&record.name) {
                continue;
            }
            if let Some(url) = self.try_endpoint(&record, &mut tried, on_endpoint) {
                return Ok((url, record.name));
            }
        }

        for record in self.registry.enabled() {
            if tried.contains(&record.name) {
                continue;
            }
            info!("尝试其他API: {}", record.name);
            if let Some(url) = self.try_endpoint(&record, &mut tried, on_endpoint) {
                return Ok((url, record.name));
            }
        }

        Err(DownloadError::Unresolved)
    }

    fn try_endpoint(
        &self,
        record: &EndpointRecord,
        tried: &mut HashSet<String>,
        on_endpoint: &mut dyn FnMut(&str),
    ) -> Option<String> {
        tried.insert(record.name.clone());
        on_endpoint(&record.name);
        self.resolver.resolve(record)
    }

    /// 弹出缓存中仍然存在且启用的端点；失效的名称直接丢弃。
    fn pop_cached_record(&self) -> Option<EndpointRecord> {
        loop {
            let name = self.lock().name_cache.pop_front()?;
            match self.registry.endpoint_by_name(&name) {
                Some(record) if record.enabled => return Some(record),
                _ => debug!(target: "preload", "丢弃失效的缓存端点: {}", name),
            }
        }
    }

    /// 补充名称缓存 → 逐个解析填满预加载池 → 再补充名称缓存。
    /// `cancel` 置位后在下一次网络请求前退出。
    pub fn preload_refill(&self, cancel: &AtomicBool) {
        let generation = self.lock().generation;
        self.fill_name_cache(cancel, generation);
        self.fill_preload_pool(cancel, generation);
        self.fill_name_cache(cancel, generation);

        let snapshot = self.pool_snapshot();
        debug!(
            target: "preload",
            "预加载完成: 图片 {}/{}，端点缓存 {}/{}",
            snapshot.preloaded,
            self.limits.preload_size,
            snapshot.cached_names,
            self.limits.name_cache_size
        );
    }

    fn fill_name_cache(&self, cancel: &AtomicBool, generation: u64) {
        let cap = self.limits.name_cache_size;
        let budget = cap.saturating_mul(3).max(1);
        for _ in 0..budget {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let Some(record) = self.registry.pick_random() else {
                return;
            };
            let mut state = self.lock();
            if state.generation != generation || state.name_cache.len() >= cap {
                return;
            }
            if !state.name_cache.contains(&record.name) {
                state.name_cache.push_back(record.name);
            }
        }
    }

    fn fill_preload_pool(&self, cancel: &AtomicBool, generation: u64) {
        let cap = self.limits.preload_size;
        let budget = cap.saturating_mul(2).max(1);
        for _ in 0..budget {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let name = {
                let mut state = self.lock();
                if state.generation != generation || state.preload_pool.len() >= cap {
                    return;
                }
                match state.name_cache.pop_front() {
                    Some(name) => name,
                    None => return,
                }
            };
            let Some(record) = self.registry.endpoint_by_name(&name).filter(|r| r.enabled) else {
                continue;
            };
            let Some(url) = self.resolver.resolve(&record) else {
                continue;
            };

            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            if state.preload_pool.len() < cap && !state.preload_pool.iter().any(|e| e.url == url) {
                debug!(target: "preload", "预加载图片成功 [{}]: {}", name, url);
                state.preload_pool.push_back(PreloadEntry {
                    url,
                    endpoint: name,
                });
            }
        }
    }
}

struct BusyGuard<'a> {
    service: &'a DownloadService,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.service.lock().is_downloading = false;
    }
}
