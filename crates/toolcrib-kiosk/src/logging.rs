//! Structured logging for the kiosk.
//!
//! Everything logs through `tracing`. The subscriber is installed once at
//! startup; the level comes from config and can be overridden by `RUST_LOG`.
//! While the terminal UI owns the screen, stderr output would corrupt the
//! display, so `init_logging` can be told to write to the log file only.
//!
//! Field names used across the crate:
//! - `location`: the page location being loaded or navigated to
//! - `session`: the session identifier embedded in the page
//! - `drawer`: the pending drawer number
//! - `action`: the action button that issued a request

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error. `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Where log lines may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// stderr, plus the configured file if any.
    Console,
    /// The configured file only; nothing at all if no file is configured.
    FileOnly,
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| Error::msg(format!("invalid log level '{level}': {e}")))
}

fn open_log_file(path: &PathBuf) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::msg(format!("failed to open log file {}: {e}", path.display())))
}

pub fn init_logging(cfg: &LogConfig, target: LogTarget) -> Result<()> {
    let filter = build_filter(&cfg.level)?;
    let file = cfg.file.as_ref().map(open_log_file).transpose()?;
    let console = target == LogTarget::Console;

    let installed = match cfg.format {
        LogFormat::Pretty => {
            let stderr_layer = console.then(|| {
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(true)
            });
            let file_layer = file.map(|f| {
                fmt::layer()
                    .with_writer(Mutex::new(f))
                    .with_target(true)
                    .with_ansi(false)
            });
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
        }
        LogFormat::Json => {
            let stderr_layer = console.then(|| {
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .flatten_event(true)
            });
            let file_layer = file.map(|f| {
                fmt::layer()
                    .json()
                    .with_writer(Mutex::new(f))
                    .with_current_span(true)
                    .flatten_event(true)
            });
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
        }
    };

    installed.map_err(|e| Error::msg(format!("failed to install log subscriber: {e}")))
}
