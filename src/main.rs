//! Random Image Downloader（随机图片下载器）。
//!
//! 从大量第三方随机图片 API 中按权重抽取一个，解析出真实图片地址并下载到本地；
//! 后台预加载若干已解析的地址，下一次下载可以立即开始。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志等基础设施
//! - `endpoint`：API 列表解析、注册表与加权抽取
//! - `third_party`：HTTP 客户端与列表来源
//! - `download`：地址解析、字节下载、下载编排与预加载
//! - `app`：应用根对象
//! - `ui`：行式交互

use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

mod app;
mod base_system;
mod download;
mod endpoint;
mod third_party;
mod ui;

#[cfg(test)]
mod test_support;

use app::App;
use base_system::config::load_or_default;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use endpoint::ApiSource;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "random-image-downloader")]
#[command(about = "Random Image Downloader（随机图片下载器）")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml、apis.txt 和 logs 等文件）
    #[arg(long)]
    data_dir: Option<String>,

    /// 本次运行使用的API来源（recommended / local），不写入配置文件
    #[arg(long)]
    source: Option<ApiSource>,

    /// 列出当前来源的API后退出
    #[arg(long, default_value_t = false)]
    list: bool,

    /// 非交互模式：连续下载 N 张图片后退出
    #[arg(long)]
    count: Option<usize>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("Random Image Downloader v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    if let Some(dir) = data_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("创建数据目录失败: {}", dir.display()))?;
    }
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config = load_or_default::<Config>(data_dir).with_base_dir(data_dir);
    let mut app = App::new(config).context("初始化失败")?;
    if let Some(source) = cli.source {
        app.use_source_for_run(source);
    }
    let cancel = app.cancel_handle();
    log.add_exit_hook(move || cancel.store(true, Ordering::Relaxed));

    match app.load_endpoints() {
        Ok(0) => warn!(
            target: "startup",
            "{}为空，可以编辑 {} 或切换来源",
            app.active_source().label(),
            app.config().local_api_path().display()
        ),
        Ok(_) => {}
        Err(err) => warn!(target: "startup", "API列表加载失败: {}", err),
    }

    let result = if cli.list {
        ui::noui::print_endpoints(&app);
        Ok(())
    } else if let Some(count) = cli.count {
        ui::noui::download_many(&app, count)
    } else {
        ui::noui::run(&mut app)
    };

    app.shutdown();
    result
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
