//! Checkpoint model for tracking masking progress
//!
//! A checkpoint records the last document id whose batch was committed to the
//! destination. It is keyed by a [`CheckpointKey`] so one source/destination
//! pair has exactly one resumable cursor.

use crate::domain::ids::{CheckpointKey, DocumentId, RunId};
use crate::domain::{PhimaskError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Run status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Run is in progress
    InProgress,
    /// Run completed successfully
    Completed,
    /// Run failed with an error
    Failed,
    /// Run was interrupted by a shutdown signal
    Interrupted,
    /// Run was never started
    NotStarted,
}

impl Default for CheckpointStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl CheckpointStatus {
    /// Lowercase label for display
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
            Self::NotStarted => "not_started",
        }
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "interrupted" => Ok(Self::Interrupted),
            "not_started" => Ok(Self::NotStarted),
            other => Err(format!("unknown checkpoint status '{other}'")),
        }
    }
}

/// Durable cursor of one masking run
///
/// # Examples
///
/// ```
/// use phimask::core::state::checkpoint::{CheckpointBuilder, CheckpointStatus};
/// use phimask::domain::ids::{CheckpointKey, DocumentId};
///
/// let key = CheckpointKey::new("patients__patients_masked").unwrap();
/// let mut checkpoint = CheckpointBuilder::new(key, "patients", "patients_masked").build();
///
/// checkpoint.mark_started();
/// checkpoint.advance(DocumentId::Int(10), 10).unwrap();
///
/// assert_eq!(checkpoint.documents_processed, 10);
/// assert_eq!(checkpoint.status, CheckpointStatus::InProgress);
/// assert!(checkpoint.advance(DocumentId::Int(5), 1).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Storage key
    pub key: CheckpointKey,

    /// Run that last wrote this checkpoint
    pub run_id: RunId,

    /// Id of the last document in the last committed batch
    pub last_processed_id: Option<DocumentId>,

    /// Documents processed across committed batches
    pub documents_processed: u64,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the checkpoint was last written
    pub updated_at: DateTime<Utc>,

    /// When the run reached a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Run status
    #[serde(default)]
    pub status: CheckpointStatus,

    /// Source collection
    pub source: String,

    /// Destination collection
    pub destination: String,
}

impl Checkpoint {
    /// Check if this checkpoint indicates a run is in progress
    pub fn is_in_progress(&self) -> bool {
        self.status == CheckpointStatus::InProgress
    }

    /// Check if the last run completed successfully
    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
    }

    /// Check if the last run failed
    pub fn is_failed(&self) -> bool {
        self.status == CheckpointStatus::Failed
    }

    /// Whether a later run can continue after this cursor
    pub fn is_resumable(&self) -> bool {
        self.last_processed_id.is_some()
            && matches!(
                self.status,
                CheckpointStatus::InProgress
                    | CheckpointStatus::Interrupted
                    | CheckpointStatus::Failed
            )
    }

    /// Duration of the run if it reached a terminal status
    pub fn run_duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|completed| completed - self.started_at)
    }

    /// Mark the run as started
    pub fn mark_started(&mut self) {
        let now = Utc::now();
        self.started_at = now;
        self.updated_at = now;
        self.status = CheckpointStatus::InProgress;
        self.completed_at = None;
    }

    /// Continue a previous run under a new run id, keeping its cursor
    pub fn mark_resumed(&mut self, run_id: RunId) {
        self.run_id = run_id;
        self.updated_at = Utc::now();
        self.status = CheckpointStatus::InProgress;
        self.completed_at = None;
    }

    /// Mark the run as completed
    pub fn mark_completed(&mut self) {
        self.finish(CheckpointStatus::Completed);
    }

    /// Mark the run as failed
    pub fn mark_failed(&mut self) {
        self.finish(CheckpointStatus::Failed);
    }

    /// Mark the run as interrupted
    pub fn mark_interrupted(&mut self) {
        self.finish(CheckpointStatus::Interrupted);
    }

    fn finish(&mut self, status: CheckpointStatus) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        self.status = status;
    }

    /// Move the cursor after a committed batch
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::Validation` if `last_id` is lower than the
    /// current cursor; the cursor never moves backwards.
    pub fn advance(&mut self, last_id: DocumentId, processed: u64) -> Result<()> {
        if let Some(current) = &self.last_processed_id {
            if last_id < *current {
                return Err(PhimaskError::Validation(format!(
                    "checkpoint cursor cannot move backwards from {current} to {last_id}"
                )));
            }
        }
        self.last_processed_id = Some(last_id);
        self.documents_processed += processed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Builder for creating Checkpoint instances
pub struct CheckpointBuilder {
    key: CheckpointKey,
    source: String,
    destination: String,
    run_id: Option<RunId>,
    last_processed_id: Option<DocumentId>,
    documents_processed: u64,
    started_at: Option<DateTime<Utc>>,
    status: CheckpointStatus,
}

impl CheckpointBuilder {
    /// Create a new CheckpointBuilder
    ///
    /// # Arguments
    ///
    /// * `key` - Storage key
    /// * `source` - Source collection name
    /// * `destination` - Destination collection name
    pub fn new(key: CheckpointKey, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            key,
            source: source.into(),
            destination: destination.into(),
            run_id: None,
            last_processed_id: None,
            documents_processed: 0,
            started_at: None,
            status: CheckpointStatus::NotStarted,
        }
    }

    /// Set the run id
    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Set the cursor
    pub fn last_processed_id(mut self, id: DocumentId) -> Self {
        self.last_processed_id = Some(id);
        self
    }

    /// Set the processed count
    pub fn documents_processed(mut self, count: u64) -> Self {
        self.documents_processed = count;
        self
    }

    /// Set the start timestamp
    pub fn started_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.started_at = Some(timestamp);
        self
    }

    /// Set the status
    pub fn status(mut self, status: CheckpointStatus) -> Self {
        self.status = status;
        self
    }

    /// Build the Checkpoint instance
    pub fn build(self) -> Checkpoint {
        let now = Utc::now();
        Checkpoint {
            key: self.key,
            run_id: self.run_id.unwrap_or_else(RunId::generate),
            last_processed_id: self.last_processed_id,
            documents_processed: self.documents_processed,
            started_at: self.started_at.unwrap_or(now),
            updated_at: now,
            completed_at: None,
            status: self.status,
            source: self.source,
            destination: self.destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        CheckpointBuilder::new(CheckpointKey::new("src__dst").unwrap(), "src", "dst").build()
    }

    #[test]
    fn test_checkpoint_builder() {
        let cp = CheckpointBuilder::new(CheckpointKey::new("a__b").unwrap(), "a", "b")
            .documents_processed(50)
            .last_processed_id(DocumentId::Int(50))
            .build();

        assert_eq!(cp.documents_processed, 50);
        assert_eq!(cp.last_processed_id, Some(DocumentId::Int(50)));
        assert_eq!(cp.status, CheckpointStatus::NotStarted);
        assert_eq!(cp.source, "a");
        assert_eq!(cp.destination, "b");
    }

    #[test]
    fn test_mark_started() {
        let mut cp = checkpoint();
        cp.mark_started();

        assert!(cp.is_in_progress());
        assert!(!cp.is_completed());
        assert!(!cp.is_failed());
        assert!(cp.completed_at.is_none());
    }

    #[test]
    fn test_mark_completed() {
        let mut cp = checkpoint();
        cp.mark_started();
        cp.mark_completed();

        assert!(cp.is_completed());
        assert!(cp.run_duration().is_some());
    }

    #[test]
    fn test_mark_interrupted_is_resumable() {
        let mut cp = checkpoint();
        cp.mark_started();
        assert!(!cp.is_resumable());

        cp.advance(DocumentId::Int(3), 3).unwrap();
        cp.mark_interrupted();
        assert_eq!(cp.status, CheckpointStatus::Interrupted);
        assert!(cp.is_resumable());

        cp.mark_completed();
        assert!(!cp.is_resumable());
    }

    #[test]
    fn test_mark_resumed_keeps_cursor() {
        let mut cp = checkpoint();
        cp.mark_started();
        cp.advance(DocumentId::from("m"), 4).unwrap();
        cp.mark_failed();

        let run_id = RunId::generate();
        cp.mark_resumed(run_id);
        assert_eq!(cp.run_id, run_id);
        assert!(cp.is_in_progress());
        assert_eq!(cp.last_processed_id, Some(DocumentId::from("m")));
        assert_eq!(cp.documents_processed, 4);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut cp = checkpoint();
        cp.advance(DocumentId::Int(10), 10).unwrap();
        cp.advance(DocumentId::Int(10), 0).unwrap();
        cp.advance(DocumentId::Int(20), 10).unwrap();
        assert_eq!(cp.documents_processed, 20);

        let err = cp.advance(DocumentId::Int(19), 1).unwrap_err();
        assert!(matches!(err, PhimaskError::Validation(_)));
        assert_eq!(cp.last_processed_id, Some(DocumentId::Int(20)));
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in [
            CheckpointStatus::InProgress,
            CheckpointStatus::Completed,
            CheckpointStatus::Failed,
            CheckpointStatus::Interrupted,
            CheckpointStatus::NotStarted,
        ] {
            assert_eq!(status.as_str().parse::<CheckpointStatus>(), Ok(status));
        }
        assert!("paused".parse::<CheckpointStatus>().is_err());
    }

    #[test]
    fn test_checkpoint_serde_layout() {
        let mut cp = checkpoint();
        cp.advance(DocumentId::Int(7), 7).unwrap();
        let value = serde_json::to_value(&cp).unwrap();

        assert_eq!(value["key"], "src__dst");
        assert_eq!(value["last_processed_id"], 7);
        assert_eq!(value["status"], "not_started");

        let back: Checkpoint = serde_json::from_value(value).unwrap();
        assert_eq!(back, cp);
    }
}
