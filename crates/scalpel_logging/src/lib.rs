//! Shared logging utilities for ScalpelLab binaries.
//!
//! Every binary writes human-readable logs to stderr and a daily rolling
//! file under `<scalpel home>/logs`. The filter comes from `RUST_LOG` when
//! set, otherwise [`DEFAULT_LOG_FILTER`].

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "scalpel=info,scalpel_db=info";
const VERBOSE_LOG_FILTER: &str = "scalpel=debug,scalpel_db=debug,tower_http=debug";

/// Logging configuration shared by ScalpelLab binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Keep stderr quiet (warn and above) unless `verbose` is set.
    /// Used by commands whose stdout is machine-readable.
    pub quiet_console: bool,
    /// Override for the log directory. Defaults to [`logs_dir`].
    pub log_dir: Option<PathBuf>,
}

/// Holds the background file writer alive. Drop it last in `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with a daily rolling file writer and stderr output.
///
/// A failure to create the log directory is not fatal: logging falls back to
/// stderr only and a warning is emitted once the subscriber is installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let file_filter = env_filter_or_default();
    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else if config.quiet_console {
        EnvFilter::new("warn")
    } else {
        env_filter_or_default()
    };

    let log_dir = config.log_dir.clone().unwrap_or_else(logs_dir);
    let (file_layer, guard, dir_error) = match ensure_dir(&log_dir) {
        Ok(()) => {
            let appender =
                tracing_appender::rolling::daily(&log_dir, format!("{}.log", config.app_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(err) = dir_error {
        tracing::warn!(dir = %log_dir.display(), error = %err, "File logging disabled");
    }

    Ok(LogGuard { _file: guard })
}

fn env_filter_or_default() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))
}

/// Get the ScalpelLab home directory.
///
/// Priority:
/// 1) SCALPEL_HOME
/// 2) ~/.scalpel
/// 3) ./.scalpel
pub fn scalpel_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("SCALPEL_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|h| h.join(".scalpel"))
        .unwrap_or_else(|| PathBuf::from(".").join(".scalpel"))
}

/// Get the logs directory: <home>/logs
pub fn logs_dir() -> PathBuf {
    scalpel_home().join("logs")
}
