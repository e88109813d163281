//! Audit log of committed batches
//!
//! Records are sent over an mpsc channel to one writer task, so the log file
//! has a single writer regardless of how many batches are in flight. Records
//! carry document ids and per-pattern counts only, never field values.

use crate::domain::{DocumentId, PhimaskError, Result, RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 64;
const HASH_PREFIX_LEN: usize = 16;

/// One committed batch
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// When the batch was committed
    pub timestamp: DateTime<Utc>,
    /// Run that produced the batch
    pub run_id: RunId,
    /// Batch sequence number within the run (1-based)
    pub batch: u64,
    /// First document id in the batch
    pub first_id: Option<DocumentId>,
    /// Last document id in the batch
    pub last_id: Option<DocumentId>,
    /// Documents written
    pub documents: usize,
    /// Fields replaced across the batch
    pub masked_fields: usize,
    /// Replacements per rule pattern
    pub rule_hits: BTreeMap<String, usize>,
    /// Whether writes were skipped
    pub dry_run: bool,
}

impl AuditRecord {
    fn to_plain(&self) -> String {
        let range = match (&self.first_id, &self.last_id) {
            (Some(first), Some(last)) => format!("{first}..={last}"),
            _ => "-".to_string(),
        };
        let hits: Vec<String> = self
            .rule_hits
            .iter()
            .map(|(pattern, n)| format!("{pattern}={n}"))
            .collect();
        format!(
            "[{}] Run: {} | Batch: {} | Ids: {} | Documents: {} | Masked fields: {} | Rules: {}{}",
            self.timestamp.to_rfc3339(),
            self.run_id,
            self.batch,
            range,
            self.documents,
            self.masked_fields,
            if hits.is_empty() { "-".to_string() } else { hits.join(",") },
            if self.dry_run { " | DRY RUN" } else { "" }
        )
    }
}

/// Handle to the audit writer task
pub struct AuditLogger {
    tx: mpsc::Sender<AuditRecord>,
    handle: JoinHandle<Result<usize>>,
}

impl AuditLogger {
    /// Opens the log file and starts the writer task
    ///
    /// # Arguments
    ///
    /// * `log_path` - File to append to; parent directories are created
    /// * `json_format` - JSON lines when true, plain text otherwise
    pub async fn spawn(log_path: PathBuf, json_format: bool) -> Result<Self> {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PhimaskError::Io(format!(
                    "Failed to create audit log directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|e| {
                PhimaskError::Io(format!(
                    "Failed to open audit log {}: {e}",
                    log_path.display()
                ))
            })?;

        let (tx, mut rx) = mpsc::channel::<AuditRecord>(CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(record) = rx.recv().await {
                let line = if json_format {
                    serde_json::to_string(&record)?
                } else {
                    record.to_plain()
                };
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await?;
                written += 1;
            }
            file.flush().await?;
            Ok::<usize, PhimaskError>(written)
        });

        tracing::debug!(path = %log_path.display(), json_format, "Audit logger started");
        Ok(Self { tx, handle })
    }

    /// Queues a record for the writer
    pub async fn record(&self, record: AuditRecord) -> Result<()> {
        self.tx
            .send(record)
            .await
            .map_err(|_| PhimaskError::Io("Audit writer stopped".to_string()))
    }

    /// Closes the channel and waits for pending records to be written
    ///
    /// Returns the number of records written.
    pub async fn finish(self) -> Result<usize> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|e| PhimaskError::Other(format!("Audit writer task failed: {e}")))?
    }
}

/// Short SHA-256 fingerprint of a value, safe to log in place of the value
pub fn value_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_PREFIX_LEN].to_string()
}

/// Default audit log location under a base directory
pub fn default_audit_path(base: &Path) -> PathBuf {
    base.join("phimask-audit.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(batch: u64) -> AuditRecord {
        let mut rule_hits = BTreeMap::new();
        rule_hits.insert("Email".to_string(), 2);
        AuditRecord {
            timestamp: Utc::now(),
            run_id: RunId::generate(),
            batch,
            first_id: Some(DocumentId::Int(1)),
            last_id: Some(DocumentId::Int(2)),
            documents: 2,
            masked_fields: 2,
            rule_hits,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_audit_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");

        let logger = AuditLogger::spawn(path.clone(), true).await.unwrap();
        logger.record(record(1)).await.unwrap();
        logger.record(record(2)).await.unwrap();
        assert_eq!(logger.finish().await.unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["batch"], json!(2));
        assert_eq!(parsed["rule_hits"]["Email"], json!(2));
    }

    #[tokio::test]
    async fn test_audit_plain_text() {
        let dir = tempdir().unwrap();
        let path = default_audit_path(dir.path());

        let logger = AuditLogger::spawn(path.clone(), false).await.unwrap();
        logger.record(record(1)).await.unwrap();
        logger.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Batch: 1"));
        assert!(content.contains("Ids: 1..=2"));
        assert!(content.contains("Email=2"));
    }

    #[test]
    fn test_value_hash_is_stable_and_opaque() {
        let a = value_hash(&json!("jo@example.org"));
        assert_eq!(a, value_hash(&json!("jo@example.org")));
        assert_ne!(a, value_hash(&json!("al@example.org")));
        assert_eq!(a.len(), HASH_PREFIX_LEN);
        assert!(!a.contains("example"));
    }
}
