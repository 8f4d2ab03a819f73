//! CLI 下载进度条。
//!
//! 把 `request_download` 的两个回调（端点确定 / 分块进度）转成 indicatif 进度条显示。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    pub(crate) fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(100), target);
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix("图片下载");
        Self { bar }
    }

    pub(crate) fn on_endpoint(&self, name: &str) {
        self.bar.set_prefix(format!("图片下载 [{name}]"));
    }

    pub(crate) fn on_progress(&self, percent: u8, total: u64) {
        if total > 0 {
            self.bar.set_message(format_size(total));
        }
        self.bar.set_position(u64::from(percent.min(100)));
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.bar.position()
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }

    #[test]
    fn hidden_bar_tracks_percent() {
        let bar = DownloadBar::new(false);
        bar.on_endpoint("cat");
        bar.on_progress(40, 1000);
        assert_eq!(bar.position(), 40);
        bar.on_progress(250, 1000);
        assert_eq!(bar.position(), 100);
        bar.finish();
    }
}
