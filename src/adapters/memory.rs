//! In-memory stores
//!
//! Used by tests and by callers embedding phimask over data they already
//! hold in memory.

use crate::adapters::database::traits::{
    json_contains, CheckpointStorage, CollectionQuery, DocumentStore, StoredRecord,
};
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::document::Document;
use crate::domain::ids::{CheckpointKey, DocumentId};
use crate::domain::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use tokio::sync::RwLock;

/// Collection backed by an ordered map
#[derive(Debug, Default)]
pub struct InMemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<DocumentId, Value>>,
}

impl InMemoryCollection {
    /// Creates an empty collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a collection holding the given documents
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::MalformedDocument` if a value has no usable `_id`.
    pub fn with_documents(name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let mut documents = BTreeMap::new();
        for value in values {
            let document = Document::from_value(value)?;
            documents.insert(document.id().clone(), document.into_value());
        }
        Ok(Self {
            name: name.into(),
            documents: RwLock::new(documents),
        })
    }

    /// Stores a raw value under an id without validating it
    pub async fn insert_raw(&self, id: DocumentId, raw: Value) {
        self.documents.write().await.insert(id, raw);
    }

    /// Returns the stored value for an id
    pub async fn get(&self, id: &DocumentId) -> Option<Value> {
        self.documents.read().await.get(id).cloned()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the collection is empty
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// All stored values in id order
    pub async fn snapshot(&self) -> Vec<Value> {
        self.documents.read().await.values().cloned().collect()
    }

    fn matches(raw: &Value, query: &CollectionQuery) -> bool {
        query
            .filter
            .as_ref()
            .map_or(true, |filter| json_contains(raw, filter))
    }
}

#[async_trait]
impl DocumentStore for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        let documents = self.documents.read().await;
        let lower = match &query.after {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        let count = documents
            .range((lower, Bound::Unbounded))
            .filter(|(_, raw)| Self::matches(raw, query))
            .count();
        Ok(count as u64)
    }

    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>> {
        let documents = self.documents.read().await;
        let lower = match &query.after {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        Ok(documents
            .range((lower, Bound::Unbounded))
            .filter(|(_, raw)| Self::matches(raw, query))
            .take(limit)
            .map(|(id, raw)| StoredRecord {
                id: id.clone(),
                raw: raw.clone(),
            })
            .collect())
    }

    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>> {
        let documents = self.documents.read().await;
        Ok(ids
            .iter()
            .filter(|id| documents.contains_key(id))
            .cloned()
            .collect())
    }

    async fn upsert_many(&self, documents: &[Document]) -> Result<usize> {
        let mut stored = self.documents.write().await;
        for document in documents {
            stored.insert(document.id().clone(), Value::Object(document.body().clone()));
        }
        Ok(documents.len())
    }

    async fn fetch_many(&self, ids: &[DocumentId]) -> Result<Vec<StoredRecord>> {
        let documents = self.documents.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                documents.get(id).map(|raw| StoredRecord {
                    id: id.clone(),
                    raw: raw.clone(),
                })
            })
            .collect())
    }
}

/// Checkpoint store held in memory
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(key.as_str()).cloned())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.key.as_str().to_string(), checkpoint.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut all: Vec<Checkpoint> = self.checkpoints.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        Ok(all)
    }
}
