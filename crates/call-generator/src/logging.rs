//! Logging setup for callgen binaries and tests

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{CallGenError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Write log output to this file instead of stderr
    pub log_file: Option<PathBuf>,
    /// Application name used in the welcome message
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::WARN,
            json: false,
            file_info: false,
            log_file: None,
            app_name: "callgen".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Send log output to a file
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Map a `-t` repeat count to a level
pub fn level_for_verbosity(count: u8) -> Level {
    match count {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Set up the global subscriber.
///
/// When logging to a file the returned guard must be held until exit so the
/// background writer flushes.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let mut subscriber = fmt::Subscriber::builder().with_env_filter(filter);

    if config.file_info {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    let (result, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| CallGenError::Logging {
                    message: format!("invalid log file path: {}", path.display()),
                })?;
            let file_appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = subscriber.with_writer(non_blocking).with_ansi(false);
            let result = if config.json {
                subscriber.json().try_init()
            } else {
                subscriber.try_init()
            };
            (result, Some(guard))
        }
        None => {
            let subscriber = subscriber.with_writer(std::io::stderr);
            let result = if config.json {
                subscriber.json().try_init()
            } else {
                subscriber.try_init()
            };
            (result, None)
        }
    };

    result.map_err(|e| CallGenError::Logging {
        message: e.to_string(),
    })?;

    Ok(guard)
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| CallGenError::config(format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(config: &LoggingConfig, version: &str) {
    tracing::info!("Starting {} v{} at level {}", config.app_name, version, config.level);
}
