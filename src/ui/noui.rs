//! 无 UI 行式交互：下载、查看/编辑 API 列表、切换来源。

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, bail};
use tracing::warn;

use crate::app::App;
use crate::download::progress::{DownloadBar, format_size};
use crate::download::{DownloadError, DownloadOutcome, DownloadStatus};
use crate::endpoint::ApiSource;

const HELP: &str = "命令：\n\
  回车 / d          下载一张随机图片\n\
  l                 查看API列表\n\
  s [recommended|local]  切换API来源（不带参数时在两者间切换）\n\
  a <定义行>        添加/替换API（仅本次运行有效），格式同 apis.txt\n\
  t <名称>          启用/禁用API\n\
  w <名称> <权重>   设置权重（0-100）\n\
  p <名称> [参数]   设置请求参数（留空清除）\n\
  status            查看当前任务与预加载状态\n\
  h                 显示帮助\n\
  q                 退出";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Download,
    List,
    Switch(Option<ApiSource>),
    Add(String),
    Toggle(String),
    Weight(String, u32),
    Params(String, String),
    Status,
    Help,
    Quit,
    Invalid(String),
}

fn parse_command(input: &str) -> Command {
    let text = input.trim();
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    match head.to_ascii_lowercase().as_str() {
        "" | "d" => Command::Download,
        "l" => Command::List,
        "status" => Command::Status,
        "h" | "?" | "help" => Command::Help,
        "q" => Command::Quit,
        "s" if rest.is_empty() => Command::Switch(None),
        "s" => match rest.parse::<ApiSource>() {
            Ok(source) => Command::Switch(Some(source)),
            Err(msg) => Command::Invalid(msg),
        },
        "a" if !rest.is_empty() => Command::Add(rest.to_string()),
        "t" if !rest.is_empty() => Command::Toggle(rest.to_string()),
        "w" => match rest.rsplit_once(char::is_whitespace) {
            Some((name, weight)) => match weight.trim().parse::<u32>() {
                Ok(weight) if weight <= 100 => Command::Weight(name.trim().to_string(), weight),
                _ => Command::Invalid(format!("权重必须是 0-100 的整数: {}", weight.trim())),
            },
            None => Command::Invalid("用法: w <名称> <权重>".to_string()),
        },
        "p" if !rest.is_empty() => match rest.split_once(char::is_whitespace) {
            Some((name, params)) => Command::Params(name.to_string(), params.trim().to_string()),
            None => Command::Params(rest.to_string(), String::new()),
        },
        "a" => Command::Invalid("用法: a [!] [名称:] URL [{描述}] [|权重|]".to_string()),
        "t" => Command::Invalid("用法: t <名称>".to_string()),
        "p" => Command::Invalid("用法: p <名称> [参数]".to_string()),
        other => Command::Invalid(format!("未知命令: {other}（输入 h 查看帮助）")),
    }
}

pub fn run(app: &mut App) -> Result<()> {
    println!(
        "欢迎使用随机图片下载器! v{}\n当前来源: {}，图片保存到 {}\n{}\n",
        env!("CARGO_PKG_VERSION"),
        app.active_source().label(),
        app.download_dir().display(),
        HELP
    );

    loop {
        let Some(input) = read_line("> ")? else {
            println!();
            break;
        };
        match parse_command(&input) {
            Command::Download => {
                if let Err(err) = download_once(app) {
                    println!("{err}");
                }
            }
            Command::List => print_endpoints(app),
            Command::Switch(target) => {
                let target = target.unwrap_or_else(|| app.active_source().toggled());
                match app.switch_source(target) {
                    Ok(count) => println!("已切换到{}，共 {} 个API", target.label(), count),
                    Err(err) => println!("切换到{}失败: {}", target.label(), err),
                }
            }
            Command::Add(line) => match app.add_endpoint(&line) {
                Some((name, true)) => println!("已替换API: {name}"),
                Some((name, false)) => println!("已添加API: {name}"),
                None => println!("无法解析: {line}"),
            },
            Command::Toggle(name) => match app.endpoint_by_name(&name) {
                Some(record) => {
                    app.set_enabled(&name, !record.enabled);
                    save_settings(app);
                    println!("{} 已{}", name, if record.enabled { "禁用" } else { "启用" });
                }
                None => println!("未找到API: {name}"),
            },
            Command::Weight(name, weight) => {
                if app.set_weight(&name, weight) {
                    save_settings(app);
                    println!("{name} 的权重已设置为 {weight}");
                } else {
                    println!("未找到API: {name}");
                }
            }
            Command::Params(name, params) => match app.endpoint_by_name(&name) {
                Some(record) => {
                    if !record.supports_params && !params.is_empty() {
                        println!("提示: {name} 未标记为支持参数，参数仍会附加到请求地址");
                    }
                    app.set_params(&name, &params);
                    save_settings(app);
                    println!("{name} 的参数已设置为 \"{params}\"");
                }
                None => println!("未找到API: {name}"),
            },
            Command::Status => print_status(app),
            Command::Help => println!("{HELP}"),
            Command::Quit => {
                println!("已退出。");
                break;
            }
            Command::Invalid(msg) => println!("{msg}"),
        }
    }
    Ok(())
}

/// 非交互模式：连续下载 `count` 张，全部失败时返回错误。
pub fn download_many(app: &App, count: usize) -> Result<()> {
    let mut ok = 0usize;
    for idx in 1..=count {
        println!("[{idx}/{count}]");
        match download_once(app) {
            Ok(_) => ok += 1,
            Err(err) => println!("{err}"),
        }
    }
    println!("完成: 成功 {ok} / {count}");
    if count > 0 && ok == 0 {
        bail!("所有下载均失败");
    }
    Ok(())
}

fn download_once(app: &App) -> Result<DownloadOutcome, DownloadError> {
    let bar = DownloadBar::new(io::stderr().is_terminal());
    let result = app.download(
        &mut |pct, total| bar.on_progress(pct, total),
        &mut |name| bar.on_endpoint(name),
    );
    bar.finish();

    match &result {
        Ok(outcome) => {
            let size = app
                .downloads()
                .current_task()
                .map(|t| t.total_size)
                .filter(|s| *s > 0)
                .map(format_size)
                .unwrap_or_else(|| "未知大小".to_string());
            println!(
                "下载成功 [{}]: {} ({})",
                outcome.endpoint,
                outcome.save_path.display(),
                size
            );
        }
        Err(err) => warn!("下载未完成: {}", err),
    }
    result
}

pub fn print_endpoints(app: &App) {
    let endpoints = app.endpoints();
    println!("{}（共 {} 个）:", app.active_source().label(), endpoints.len());
    if endpoints.is_empty() {
        println!("  （空）");
        return;
    }
    for record in endpoints {
        let mut line = format!(
            "  [{}] {:<20} 权重 {:>3}  {}",
            if record.enabled { "x" } else { " " },
            record.name,
            record.weight,
            record.url
        );
        if record.supports_params {
            line.push_str(&format!("  参数: \"{}\"", record.params));
        }
        if !record.description.is_empty() {
            line.push_str(&format!("  {}", record.description));
        }
        println!("{line}");
    }
}

fn print_status(app: &App) {
    let downloads = app.downloads();
    match downloads.current_task() {
        Some(task) if task.status == DownloadStatus::Failed => {
            println!("当前任务: {} [{}] {}", task.status, task.api_name, task.error_message)
        }
        Some(task) => println!(
            "当前任务: {} [{}] {}% {}",
            task.status,
            task.api_name,
            task.progress,
            task.save_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| task.url.clone())
        ),
        None => println!("当前任务: {}", DownloadStatus::Idle),
    }
    let pools = downloads.pool_snapshot();
    let limits = downloads.limits();
    println!(
        "预加载: 图片 {}/{}，API缓存 {}/{}",
        pools.preloaded, limits.preload_size, pools.cached_names, limits.name_cache_size
    );
}

fn save_settings(app: &mut App) {
    if !app.save_endpoint_settings() {
        println!("保存API设置失败，详见日志");
    }
}

/// 读取一行输入；EOF 时返回 `None`。
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    if stdin.lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
