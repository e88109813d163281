//! Run summary and reporting
//!
//! This module defines structures for tracking and reporting the results of
//! a masking run. A summary is produced for every run, including failed and
//! interrupted ones.

use crate::core::verification::report::VerificationReport;
use crate::domain::ids::{DocumentId, RunId};
use crate::domain::PhimaskError;
use std::fmt;
use std::time::Duration;

/// Orchestrator lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Counting,
    Processing,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Idle => "idle",
            PipelineState::Counting => "counting",
            PipelineState::Processing => "processing",
            PipelineState::Verifying => "verifying",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Summary of a masking run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: RunId,

    /// Documents counted as eligible before processing
    pub total: u64,

    /// Documents read from the source
    pub processed: u64,

    /// Documents masked
    pub masked: u64,

    /// Fields replaced across all documents
    pub masked_fields: u64,

    /// Documents skipped because the destination already had them, or
    /// because they already carried the in-place marker
    pub skipped_existing: u64,

    /// Malformed documents skipped
    pub skipped_with_error: u64,

    /// Counted documents that were gone by the time they were read
    pub not_found: u64,

    /// Documents written to the destination
    pub written: u64,

    /// Batches committed
    pub batches: u64,

    /// Cursor the run started after, when resuming
    pub resume_point: Option<DocumentId>,

    /// Last committed cursor
    pub last_processed_id: Option<DocumentId>,

    /// Duration of the run
    pub elapsed: Duration,

    /// State the run ended in
    pub final_state: PipelineState,

    /// Whether the run stopped on a shutdown signal
    pub interrupted: bool,

    /// Whether destination writes and checkpoints were skipped
    pub dry_run: bool,

    /// Errors encountered during the run
    pub errors: Vec<RunError>,

    /// Verification report (if verification was run)
    pub verification_report: Option<VerificationReport>,
}

impl RunSummary {
    /// Create a new empty summary
    pub fn new(run_id: RunId, dry_run: bool) -> Self {
        Self {
            run_id,
            total: 0,
            processed: 0,
            masked: 0,
            masked_fields: 0,
            skipped_existing: 0,
            skipped_with_error: 0,
            not_found: 0,
            written: 0,
            batches: 0,
            resume_point: None,
            last_processed_id: None,
            elapsed: Duration::ZERO,
            final_state: PipelineState::Idle,
            interrupted: false,
            dry_run,
            errors: Vec::new(),
            verification_report: None,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Add an error
    pub fn add_error(&mut self, error: RunError) {
        self.errors.push(error);
    }

    /// Set the verification report
    pub fn set_verification_report(&mut self, report: VerificationReport) {
        self.verification_report = Some(report);
    }

    /// Documents read per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed as f64 / secs
    }

    /// Whether the run completed with nothing skipped for errors and a
    /// clean verification
    pub fn is_successful(&self) -> bool {
        self.final_state == PipelineState::Completed
            && self.skipped_with_error == 0
            && self
                .verification_report
                .as_ref()
                .map_or(true, VerificationReport::is_success)
    }

    /// Share of read documents that were masked or intentionally skipped
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 100.0;
        }
        let ok = self.processed.saturating_sub(self.skipped_with_error);
        (ok as f64 / self.processed as f64) * 100.0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            final_state = %self.final_state,
            total = self.total,
            processed = self.processed,
            masked = self.masked,
            masked_fields = self.masked_fields,
            skipped_existing = self.skipped_existing,
            skipped_with_error = self.skipped_with_error,
            not_found = self.not_found,
            written = self.written,
            batches = self.batches,
            resume_point = ?self.resume_point.as_ref().map(ToString::to_string),
            last_processed_id = ?self.last_processed_id.as_ref().map(ToString::to_string),
            interrupted = self.interrupted,
            dry_run = self.dry_run,
            duration_secs = self.elapsed.as_secs(),
            throughput = format!("{:.1}/s", self.throughput()),
            "Masking run finished"
        );

        if !self.errors.is_empty() {
            tracing::warn!(error_count = self.errors.len(), "Run finished with errors");
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    context = ?error.context,
                    "Run error"
                );
            }
        }
    }
}

/// Type of run error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorType {
    /// Invalid configuration or rule set
    Configuration,
    /// Store connection could not be established
    Connection,
    /// Store read or write failed
    Storage,
    /// Document skipped as malformed
    MalformedDocument,
    /// Checkpoint could not be read or written
    State,
    /// Post-run verification could not run
    Verification,
    /// Unknown error
    Unknown,
}

impl RunErrorType {
    /// Classify a domain error
    pub fn of(error: &PhimaskError) -> Self {
        match error {
            PhimaskError::Configuration(_) => RunErrorType::Configuration,
            PhimaskError::Connection(_) => RunErrorType::Connection,
            PhimaskError::TransientStore(_)
            | PhimaskError::Database(_)
            | PhimaskError::RunFailure(_) => RunErrorType::Storage,
            PhimaskError::MalformedDocument { .. } => RunErrorType::MalformedDocument,
            PhimaskError::State(_) => RunErrorType::State,
            _ => RunErrorType::Unknown,
        }
    }
}

/// Run error with context
#[derive(Debug, Clone)]
pub struct RunError {
    /// Type of error
    pub error_type: RunErrorType,

    /// Error message
    pub message: String,

    /// Optional context (document id, operation)
    pub context: Option<String>,
}

impl RunError {
    /// Create a new run error
    pub fn new(error_type: RunErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            context: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<&PhimaskError> for RunError {
    fn from(error: &PhimaskError) -> Self {
        Self::new(RunErrorType::of(error), error.to_string())
    }
}
