//! Structured logging setup using tracing
//!
//! Console output plus an optional JSON file sink written through the
//! `tracing_appender` non-blocking worker.

use crate::config::LoggingConfig;
use crate::domain::{PhimaskError, Result};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name prefix of the local log
pub const LOG_FILE_NAME: &str = "phimask.log";

/// Flushes the file sink when dropped; hold it until the process exits
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            _file_guard: file_guard,
        }
    }
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` takes precedence over `log_level_str`.
///
/// # Errors
///
/// Returns `PhimaskError::Configuration` for an unknown level, an
/// uncreatable log directory or a second initialization in one process.
///
/// # Example
///
/// ```no_run
/// use phimask::logging::init_logging;
/// use phimask::config::LoggingConfig;
///
/// let config = LoggingConfig::default();
/// let _guard = init_logging("info", &config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_level = parse_log_level(log_level_str)?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("phimask={log_level}")));

    let mut layers = vec![tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(env_filter.clone())
        .boxed()];

    let file_guard = if config.local_enabled {
        let (writer, guard) = file_writer(config)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_filter(env_filter)
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| PhimaskError::Configuration(format!("Failed to initialize logging: {e}")))?;

    tracing::debug!(
        level = %log_level,
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        rotation = %config.local_rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard::new(file_guard))
}

fn file_writer(config: &LoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        PhimaskError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            config.local_path
        ))
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(rotation(&config.local_rotation))
        .filename_prefix(LOG_FILE_NAME)
        .build(&config.local_path)
        .map_err(|e| PhimaskError::Configuration(format!("Failed to open log file: {e}")))?;

    Ok(tracing_appender::non_blocking(appender))
}

fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(PhimaskError::Configuration(format!(
            "Invalid log level '{level_str}', expected trace, debug, info, warn or error"
        ))),
    }
}
