//! Structured logging for the command-line shell.
//!
//! Console output is human-readable and filtered for interactive use; a
//! JSON file log with daily rotation captures the full picture for
//! debugging serial sessions after the fact.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored.
    pub log_directory: PathBuf,
    /// Log file name prefix.
    pub log_file_prefix: String,
    /// Whether to also write the rotated JSON file log.
    pub file_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "mpsync".to_string(),
            file_log: true,
        }
    }
}

/// Guard that keeps file logging active. Drop this to flush and close log
/// files.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },
}

/// Initialize the logging system.
///
/// Returns a guard that must be kept alive for the duration of the process;
/// dropping it flushes pending file log entries.
///
/// # Panics
///
/// Panics if logging has already been initialized.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    // RUST_LOG overrides; otherwise keep dependencies quiet and our own
    // crates at info.
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn")
            .add_directive("mpsync=info".parse().expect("valid directive"))
            .add_directive("mpsync_core=info".parse().expect("valid directive"))
            .add_directive("mpsync_cli=info".parse().expect("valid directive"))
    });

    let console_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let (file_layer, file_guard) = if config.file_log {
        if !config.log_directory.exists() {
            std::fs::create_dir_all(&config.log_directory).map_err(|e| {
                LoggingError::DirectoryCreationFailed {
                    path: config.log_directory.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        let appender = RollingFileAppender::new(
            Rotation::DAILY,
            &config.log_directory,
            &config.log_file_prefix,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Get the default log directory.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mpsync")
        .join("logs")
}
