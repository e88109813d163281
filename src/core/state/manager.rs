//! State manager for checkpoint persistence
//!
//! Decides whether a run starts fresh or continues a previous cursor, and
//! saves checkpoints through the configured [`CheckpointStorage`].

use crate::adapters::database::traits::CheckpointStorage;
use crate::core::state::checkpoint::{Checkpoint, CheckpointBuilder};
use crate::domain::ids::{CheckpointKey, RunId};
use crate::domain::Result;
use std::sync::Arc;

/// State manager for checkpoint persistence
pub struct StateManager {
    /// Checkpoint storage backend
    storage: Arc<dyn CheckpointStorage>,
}

impl StateManager {
    /// Create a new StateManager with a checkpoint storage backend
    pub fn new_with_storage(storage: Arc<dyn CheckpointStorage>) -> Self {
        Self { storage }
    }

    /// Load a checkpoint by key
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(Checkpoint))` if found, `Ok(None)` if not found, or an error.
    pub async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        self.storage.load(key).await
    }

    /// Prepare the checkpoint of a new run
    ///
    /// With `resume`, a resumable checkpoint under `key` is taken over by
    /// `run_id` and keeps its cursor and count. Otherwise, or when nothing
    /// is resumable, a fresh in-progress checkpoint is returned. Nothing is
    /// persisted here.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing checkpoint cannot be read.
    pub async fn begin_run(
        &self,
        key: &CheckpointKey,
        source: &str,
        destination: &str,
        run_id: RunId,
        resume: bool,
    ) -> Result<Checkpoint> {
        if resume {
            match self.storage.load(key).await? {
                Some(mut checkpoint) if checkpoint.is_resumable() => {
                    tracing::info!(
                        key = %key,
                        previous_run = %checkpoint.run_id,
                        run_id = %run_id,
                        documents_processed = checkpoint.documents_processed,
                        "Resuming from checkpoint"
                    );
                    checkpoint.mark_resumed(run_id);
                    return Ok(checkpoint);
                }
                Some(checkpoint) => {
                    tracing::info!(
                        key = %key,
                        status = checkpoint.status.as_str(),
                        "Checkpoint is not resumable, starting a fresh run"
                    );
                }
                None => {
                    tracing::info!(key = %key, "No checkpoint found, starting a fresh run");
                }
            }
        }

        let mut checkpoint = CheckpointBuilder::new(key.clone(), source, destination)
            .run_id(run_id)
            .build();
        checkpoint.mark_started();
        Ok(checkpoint)
    }

    /// Save a checkpoint
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.storage.save(checkpoint).await
    }

    /// Get all checkpoints
    pub async fn list(&self) -> Result<Vec<Checkpoint>> {
        self.storage.list().await
    }

    /// Checkpoint a committed batch
    ///
    /// Used after each successful batch write so a failed run resumes at the
    /// last committed document.
    pub async fn checkpoint_batch(&self, checkpoint: &Checkpoint) -> Result<()> {
        tracing::debug!(
            key = %checkpoint.key,
            last_processed_id = ?checkpoint.last_processed_id.as_ref().map(ToString::to_string),
            documents_processed = checkpoint.documents_processed,
            "Checkpointing batch"
        );

        self.save(checkpoint).await
    }
}
