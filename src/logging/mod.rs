//! Logging and observability
//!
//! Structured `tracing` output to the console and an optional rotating JSON
//! file. Log fields carry document ids, field paths and counts; field values
//! are never logged.
//!
//! # Example
//!
//! ```no_run
//! use phimask::logging::init_logging;
//! use phimask::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(collection = "patients", "Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a masking run
///
/// # Example
///
/// ```no_run
/// use phimask::log_run_start;
/// use phimask::domain::RunId;
///
/// let run_id = RunId::generate();
/// log_run_start!(run_id, "patients", "patients_masked");
/// ```
#[macro_export]
macro_rules! log_run_start {
    ($run_id:expr, $source:expr, $destination:expr) => {
        tracing::info!(
            run_id = %$run_id,
            source = %$source,
            destination = %$destination,
            "Starting masking run"
        );
    };
}

/// Log a committed batch
///
/// # Example
///
/// ```no_run
/// use phimask::log_batch_committed;
///
/// log_batch_committed!(3, 100, 250, 1000);
/// ```
#[macro_export]
macro_rules! log_batch_committed {
    ($batch:expr, $written:expr, $processed:expr, $total:expr) => {
        tracing::info!(
            batch = $batch,
            written = $written,
            processed = $processed,
            total = $total,
            progress_pct = if $total == 0 {
                100.0
            } else {
                $processed as f64 / $total as f64 * 100.0
            },
            "Batch committed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use phimask::log_error_with_context;
/// use phimask::domain::PhimaskError;
///
/// let error = PhimaskError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use phimask::log_retry_attempt;
///
/// log_retry_attempt!("read_range", 2, 5, 1000u64, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($operation:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            operation = $operation,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
