//! Log setup.
//!
//! Two layers share one registry:
//!
//! - a file layer with the configured level, written through a daily rolling
//!   appender that keeps at most `max_files` files
//! - a console layer on stderr that only shows warnings and errors, so
//!   command output stays readable
//!
//! `RUST_LOG` takes precedence over the configured level:
//! ```bash
//! RUST_LOG=debug watchzone watch
//! RUST_LOG=watchzone::watcher=trace watchzone watch --rules
//! ```

use crate::config::LoggingConfig;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "watchzone";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Cannot create log directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("Invalid log level '{level}': {reason}")]
    Level { level: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Keeps the background log writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _worker: WorkerGuard,
    directory: PathBuf,
}

impl LogGuard {
    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }
}

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Builds the filter for the file layer.
fn file_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if std::env::var("RUST_LOG").is_ok() {
        return Ok(EnvFilter::from_default_env());
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Level {
        level: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber. Call once at startup and hold the guard
/// until the process exits.
pub fn init(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let directory = config.directory();
    std::fs::create_dir_all(&directory).map_err(|source| LoggingError::Directory {
        path: directory.clone(),
        source,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(config.max_files.max(1))
        .build(&directory)?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(file_filter(config)?);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(CompactTime)
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(directory = %directory.display(), "Logging initialized");
    Ok(LogGuard {
        _worker: worker,
        directory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "watchzone=loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(file_filter(&config), Err(LoggingError::Level { .. })));
    }

    #[test]
    fn test_configured_level_parses() {
        let config = LoggingConfig {
            level: "watchzone=debug,warn".to_string(),
            ..Default::default()
        };
        assert!(file_filter(&config).is_ok());
    }
}
