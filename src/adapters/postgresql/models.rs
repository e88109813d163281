//! PostgreSQL row models

use crate::core::state::checkpoint::{Checkpoint, CheckpointStatus};
use crate::domain::ids::{CheckpointKey, DocumentId, RunId};
use crate::domain::{PhimaskError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;
use uuid::Uuid;

/// Row of the `phimask_checkpoints` table
#[derive(Debug, Clone, PartialEq)]
pub struct PostgreSQLCheckpoint {
    pub key: String,
    pub run_id: Uuid,
    pub last_processed_id: Option<Value>,
    pub documents_processed: i64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub source: String,
    pub destination: String,
}

impl PostgreSQLCheckpoint {
    /// Convert from domain Checkpoint to a table row
    pub fn from_domain(checkpoint: &Checkpoint) -> Result<Self> {
        let documents_processed = i64::try_from(checkpoint.documents_processed).map_err(|_| {
            PhimaskError::State(format!(
                "documents_processed {} does not fit a BIGINT",
                checkpoint.documents_processed
            ))
        })?;

        Ok(Self {
            key: checkpoint.key.to_string(),
            run_id: *checkpoint.run_id.as_uuid(),
            last_processed_id: checkpoint.last_processed_id.as_ref().map(DocumentId::to_value),
            documents_processed,
            started_at: checkpoint.started_at,
            updated_at: checkpoint.updated_at,
            completed_at: checkpoint.completed_at,
            status: checkpoint.status.as_str().to_string(),
            source: checkpoint.source.clone(),
            destination: checkpoint.destination.clone(),
        })
    }

    /// Read a row selected with every column of the table
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            key: row.try_get("key")?,
            run_id: row.try_get("run_id")?,
            last_processed_id: row.try_get("last_processed_id")?,
            documents_processed: row.try_get("documents_processed")?,
            started_at: row.try_get("started_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
            status: row.try_get("status")?,
            source: row.try_get("source")?,
            destination: row.try_get("destination")?,
        })
    }

    /// Convert to domain Checkpoint
    pub fn to_domain(&self) -> Result<Checkpoint> {
        let key = CheckpointKey::new(&self.key).map_err(PhimaskError::State)?;

        let last_processed_id = self
            .last_processed_id
            .as_ref()
            .map(DocumentId::from_value)
            .transpose()
            .map_err(|e| PhimaskError::State(format!("checkpoint '{}': {e}", self.key)))?;

        let status = self
            .status
            .parse::<CheckpointStatus>()
            .map_err(PhimaskError::State)?;

        let documents_processed = u64::try_from(self.documents_processed).map_err(|_| {
            PhimaskError::State(format!(
                "checkpoint '{}' has negative documents_processed",
                self.key
            ))
        })?;

        Ok(Checkpoint {
            key,
            run_id: RunId::from(self.run_id),
            last_processed_id,
            documents_processed,
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            status,
            source: self.source.clone(),
            destination: self.destination.clone(),
        })
    }
}
