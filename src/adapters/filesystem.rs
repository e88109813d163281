//! JSON file checkpoint store
//!
//! Each checkpoint is one `<key>.json` file in a directory. Writes go to a
//! temporary file in the same directory, which is then renamed over the
//! target, so a crash never leaves a torn checkpoint behind.

use crate::adapters::database::traits::CheckpointStorage;
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::ids::CheckpointKey;
use crate::domain::{PhimaskError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const EXTENSION: &str = "json";

/// Checkpoint store writing one JSON file per key
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the checkpoint files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", key.as_str()))
    }

    async fn read_file(path: &Path) -> Result<Checkpoint> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| {
            PhimaskError::State(format!(
                "Failed to parse checkpoint {}: {e}",
                path.display()
            ))
        })
    }
}

#[async_trait]
impl CheckpointStorage for FileCheckpointStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        let path = self.path_for(key);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Self::read_file(&path).await.map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PhimaskError::State(format!(
                "Failed to create checkpoint directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let target = self.path_for(&checkpoint.key);
        let temp = target.with_extension(format!("{EXTENSION}.tmp"));
        let json = serde_json::to_vec_pretty(checkpoint)?;

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &target).await.map_err(|e| {
            PhimaskError::State(format!(
                "Failed to commit checkpoint {}: {e}",
                target.display()
            ))
        })?;

        tracing::debug!(
            key = %checkpoint.key,
            path = %target.display(),
            "Checkpoint written"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match Self::read_file(&path).await {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint")
                }
            }
        }
        checkpoints.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::checkpoint::{CheckpointBuilder, CheckpointStatus};
    use crate::domain::ids::DocumentId;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state"));
        let key = CheckpointKey::new("patients__masked").unwrap();

        assert!(store.load(&key).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());

        let mut cp = CheckpointBuilder::new(key.clone(), "patients", "masked").build();
        cp.mark_started();
        cp.advance(DocumentId::Int(42), 42).unwrap();
        store.save(&cp).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded, cp);
        assert_eq!(loaded.status, CheckpointStatus::InProgress);
        assert!(!dir.path().join("state/patients__masked.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_overwrites_and_lists() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let mut a = CheckpointBuilder::new(CheckpointKey::new("a__x").unwrap(), "a", "x").build();
        let b = CheckpointBuilder::new(CheckpointKey::new("b__x").unwrap(), "b", "x").build();
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        a.mark_completed();
        store.save(&a).await.unwrap();

        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key.as_str(), "a__x");
        assert!(all[0].is_completed());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_checkpoint_is_state_error() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let key = CheckpointKey::new("bad").unwrap();
        std::fs::write(dir.path().join("bad.json"), "not json").unwrap();

        let err = store.load(&key).await.unwrap_err();
        assert!(matches!(err, PhimaskError::State(_)));
    }
}
