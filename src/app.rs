//! 应用根对象：持有配置、端点注册表、列表来源、下载服务与预加载线程。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::base_system::config::write_with_comments;
use crate::base_system::context::Config;
use crate::download::resolver::{EndpointResolver, HttpResolver};
use crate::download::transfer::{HttpFetcher, ImageFetcher, ProgressFn};
use crate::download::{
    DownloadError, DownloadOutcome, DownloadService, PoolLimits, PreloadWorkers,
};
use crate::endpoint::registry::apply_overrides;
use crate::endpoint::{ApiSource, EndpointRecord, EndpointRegistry, parser};
use crate::third_party::endpoint_source::{EndpointSources, SourceError};
use crate::third_party::http_client::{HttpClient, HttpSettings};

pub struct App {
    config: Config,
    /// 本次运行实际使用的来源；`--source` 只改这里，不写入配置文件。
    active_source: ApiSource,
    registry: Arc<EndpointRegistry>,
    sources: EndpointSources,
    downloads: Arc<DownloadService>,
    preload: PreloadWorkers,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let http = HttpClient::new(HttpSettings::from_config(&config))
            .context("初始化 HTTP 客户端失败")?;
        let sources = EndpointSources::new(
            http.clone(),
            config.recommended_api_url.clone(),
            config.local_api_path(),
        );
        let resolver = Arc::new(HttpResolver::new(http.clone()));
        let fetcher = Arc::new(HttpFetcher::new(http));
        Ok(Self::from_parts(config, sources, resolver, fetcher))
    }

    pub(crate) fn from_parts(
        config: Config,
        sources: EndpointSources,
        resolver: Arc<dyn EndpointResolver>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let registry = Arc::new(EndpointRegistry::new());
        let downloads = Arc::new(DownloadService::new(
            Arc::clone(&registry),
            resolver,
            fetcher,
            config.download_dir(),
            PoolLimits::from_config(&config),
        ));
        let preload = PreloadWorkers::start(Arc::clone(&downloads), config.preload_workers);
        Self {
            active_source: config.api_source,
            config,
            registry,
            sources,
            downloads,
            preload,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn active_source(&self) -> ApiSource {
        self.active_source
    }

    /// 仅本次运行改用 `source`，需随后调用 `load_endpoints`。
    pub fn use_source_for_run(&mut self, source: ApiSource) {
        if self.active_source != source {
            info!("本次运行使用{}", source.label());
            self.active_source = source;
        }
    }

    pub fn downloads(&self) -> &DownloadService {
        &self.downloads
    }

    pub fn download_dir(&self) -> PathBuf {
        self.config.download_dir()
    }

    pub fn endpoints(&self) -> Vec<EndpointRecord> {
        self.registry.endpoints()
    }

    pub fn endpoint_by_name(&self, name: &str) -> Option<EndpointRecord> {
        self.registry.endpoint_by_name(name)
    }

    /// 加载当前来源的列表并套用已保存的设置。
    ///
    /// 加载失败时注册表置空（下载会报告无可用API），错误返回给调用方展示。
    pub fn load_endpoints(&self) -> Result<usize, SourceError> {
        let source = self.active_source;
        info!(target: "startup", "正在加载{}…", source.label());
        let loaded = self.sources.load(source);
        let records = match &loaded {
            Ok(text) => apply_overrides(
                parser::parse(text, source),
                self.config.overrides_for(source),
            ),
            Err(err) => {
                error!("{}", err);
                Vec::new()
            }
        };
        let count = records.len();
        self.registry.replace(records);
        self.downloads.reset_pools();
        if count > 0 {
            self.downloads.schedule_preload();
        }
        loaded.map(|_| count)
    }

    /// 切换来源：保存到配置文件后重新加载列表。
    pub fn switch_source(&mut self, source: ApiSource) -> Result<usize, SourceError> {
        if self.active_source != source {
            info!("切换API来源: {} -> {}", self.active_source.label(), source.label());
            self.active_source = source;
        }
        if self.config.api_source != source {
            self.config.api_source = source;
            self.save_config();
        }
        self.load_endpoints()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        self.registry.set_enabled(name, self.active_source, enabled)
    }

    pub fn set_weight(&self, name: &str, weight: u32) -> bool {
        self.registry.set_weight(name, self.active_source, weight)
    }

    pub fn set_params(&self, name: &str, params: &str) -> bool {
        self.registry.set_params(name, self.active_source, params)
    }

    /// 按定义行添加一个API（仅本次运行有效）；同名时替换原记录并沿用其行号。
    /// 返回 `(名称, 是否替换)`，无法解析时返回 `None`。
    pub fn add_endpoint(&self, line: &str) -> Option<(String, bool)> {
        let source = self.active_source;
        let mut record = parser::parse_line(line, source, self.registry.len() + 1)?;
        if let Some(existing) = self.registry.find(&record.name, source) {
            record.line_number = existing.line_number;
        }
        record.weight = record.weight.min(100);
        let name = record.name.clone();
        let replaced = self.registry.update(record);
        Some((name, replaced))
    }

    /// 把当前列表的权重/参数/启用状态写入配置文件。
    pub fn save_endpoint_settings(&mut self) -> bool {
        let source = self.active_source;
        self.config.set_overrides(source, self.registry.overrides());
        self.save_config()
    }

    fn save_config(&self) -> bool {
        let path = self.config.config_path();
        match write_with_comments(&self.config, &path) {
            Ok(()) => {
                info!("配置已保存: {}", path.display());
                true
            }
            Err(err) => {
                error!("保存配置失败: {}", err);
                false
            }
        }
    }

    pub fn download(
        &self,
        on_progress: ProgressFn<'_>,
        on_endpoint: &mut dyn FnMut(&str),
    ) -> Result<DownloadOutcome, DownloadError> {
        self.downloads.request_download(on_progress, on_endpoint)
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.preload.cancel_handle()
    }

    pub fn shutdown(&mut self) {
        if self.downloads.is_downloading() {
            warn!("仍有下载任务未完成，直接退出");
        }
        self.preload.shutdown();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}
