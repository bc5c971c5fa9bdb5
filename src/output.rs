use std::io::{self, Write};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::app::{FetchResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print(result)
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Byte progress bar on stderr. Falls back to a byte-counting spinner when the
/// server does not declare a length.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(url: &str, total: Option<u64>) -> ProgressBar {
        let (bar, template) = match total {
            Some(total) => (
                ProgressBar::new(total),
                "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            ),
            None => (
                ProgressBar::new_spinner(),
                "{msg} {spinner:.blue} {bytes} ({bytes_per_sec})",
            ),
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=> "));
        }
        let name = url.rsplit('/').next().unwrap_or(url).to_string();
        bar.set_message(name);
        bar
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        match event {
            ProgressEvent::Phase { message } => tracing::debug!("{message}"),
            ProgressEvent::DownloadStarted { url, total } => {
                *guard = Some(Self::start(&url, total));
            }
            ProgressEvent::DownloadAdvanced { bytes } => {
                if let Some(bar) = guard.as_ref() {
                    bar.inc(bytes);
                }
            }
            ProgressEvent::DownloadFinished => {
                if let Some(bar) = guard.take() {
                    bar.finish_and_clear();
                }
            }
        }
    }
}
