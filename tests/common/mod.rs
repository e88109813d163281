//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use phimask::adapters::database::{CollectionQuery, DocumentStore, RunStores, StoredRecord};
use phimask::adapters::memory::{InMemoryCheckpointStore, InMemoryCollection};
use phimask::config::{parse_config, PhimaskConfig};
use phimask::domain::{Document, DocumentId, PhimaskError, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const SOURCE: &str = "patients";
pub const DESTINATION: &str = "patients_masked";

/// Configuration over `patients` -> `patients_masked` with small batches,
/// fast retries and no host sampling; `extra` is appended verbatim
pub fn config(extra: &str) -> PhimaskConfig {
    let contents = format!(
        r#"
[postgresql]
connection_string = "postgresql://localhost/phi"

[source]
collection = "{SOURCE}"

[destination]
collection = "{DESTINATION}"

[resources]
enabled = false

[batch]
min_size = 1
initial_size = 2
max_size = 4

[retry]
max_attempts = 3
base_backoff_ms = 1
max_backoff_ms = 5

{extra}
"#
    );
    parse_config(&contents).expect("test configuration should parse")
}

/// Source documents `{"_id": i, "FirstName": ..., "Email": ...}` for ids in `ids`
pub fn patients(ids: impl IntoIterator<Item = i64>) -> Vec<Value> {
    ids.into_iter()
        .map(|i| {
            serde_json::json!({
                "_id": i,
                "FirstName": format!("Patient {i}"),
                "Email": format!("patient{i}@example.org"),
                "Status": "active",
            })
        })
        .collect()
}

/// In-memory stores for a run, with handles to inspect them afterwards
pub struct Fixture {
    pub source: Arc<InMemoryCollection>,
    pub destination: Arc<InMemoryCollection>,
    pub checkpoints: Arc<InMemoryCheckpointStore>,
}

impl Fixture {
    pub fn new(docs: Vec<Value>) -> Self {
        Self {
            source: Arc::new(InMemoryCollection::with_documents(SOURCE, docs).unwrap()),
            destination: Arc::new(InMemoryCollection::new(DESTINATION)),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
        }
    }

    pub fn stores(&self) -> RunStores {
        RunStores {
            source: self.source.clone(),
            destination: self.destination.clone(),
            checkpoints: self.checkpoints.clone(),
        }
    }

    /// Stores with a replacement destination
    pub fn with_destination(&self, destination: Arc<dyn DocumentStore>) -> RunStores {
        RunStores {
            destination,
            ..self.stores()
        }
    }

    /// Stores with a replacement source
    pub fn with_source(&self, source: Arc<dyn DocumentStore>) -> RunStores {
        RunStores {
            source,
            ..self.stores()
        }
    }

    /// Stores masking the source over itself
    pub fn in_place(&self) -> RunStores {
        RunStores {
            destination: self.source.clone(),
            ..self.stores()
        }
    }

    pub async fn destination_ids(&self) -> Vec<DocumentId> {
        self.destination
            .snapshot()
            .await
            .into_iter()
            .map(|raw| Document::from_value(raw).unwrap().id().clone())
            .collect()
    }
}

/// A shutdown channel that is never triggered
pub fn no_shutdown() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// Destination whose writes fail transiently a set number of times
pub struct FlakyStore {
    inner: Arc<InMemoryCollection>,
    failures_left: AtomicUsize,
    pub upsert_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryCollection>, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            upsert_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        self.inner.count(query).await
    }

    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>> {
        self.inner.read_range(query, limit).await
    }

    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>> {
        self.inner.existing_ids(ids).await
    }

    async fn upsert_many(&self, documents: &[Document]) -> Result<usize> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PhimaskError::TransientStore(
                "connection reset by peer".to_string(),
            ));
        }
        self.inner.upsert_many(documents).await
    }
}

/// Destination that accepts `ok` batches and then fails every write
pub struct FailAfter {
    inner: Arc<InMemoryCollection>,
    ok: AtomicUsize,
}

impl FailAfter {
    pub fn new(inner: Arc<InMemoryCollection>, ok: usize) -> Self {
        Self {
            inner,
            ok: AtomicUsize::new(ok),
        }
    }
}

#[async_trait]
impl DocumentStore for FailAfter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        self.inner.count(query).await
    }

    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>> {
        self.inner.read_range(query, limit).await
    }

    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>> {
        self.inner.existing_ids(ids).await
    }

    async fn upsert_many(&self, documents: &[Document]) -> Result<usize> {
        let allowed = self
            .ok
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(PhimaskError::TransientStore("connection refused".to_string()));
        }
        self.inner.upsert_many(documents).await
    }
}

/// Destination that requests shutdown once `after` batches were written
pub struct ShutdownAfter {
    inner: Arc<InMemoryCollection>,
    after: usize,
    written: AtomicUsize,
    shutdown: watch::Sender<bool>,
}

impl ShutdownAfter {
    pub fn new(
        inner: Arc<InMemoryCollection>,
        after: usize,
    ) -> (Self, watch::Receiver<bool>) {
        let (shutdown, rx) = watch::channel(false);
        (
            Self {
                inner,
                after,
                written: AtomicUsize::new(0),
                shutdown,
            },
            rx,
        )
    }
}

#[async_trait]
impl DocumentStore for ShutdownAfter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        self.inner.count(query).await
    }

    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>> {
        self.inner.read_range(query, limit).await
    }

    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>> {
        self.inner.existing_ids(ids).await
    }

    async fn upsert_many(&self, documents: &[Document]) -> Result<usize> {
        let written = self.inner.upsert_many(documents).await?;
        if self.written.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            let _ = self.shutdown.send(true);
        }
        Ok(written)
    }
}

/// Source that records the limit of every read
pub struct RecordingSource {
    inner: Arc<InMemoryCollection>,
    pub limits: Mutex<Vec<usize>>,
}

impl RecordingSource {
    pub fn new(inner: Arc<InMemoryCollection>) -> Self {
        Self {
            inner,
            limits: Mutex::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        self.inner.count(query).await
    }

    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>> {
        self.limits.lock().unwrap().push(limit);
        self.inner.read_range(query, limit).await
    }

    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>> {
        self.inner.existing_ids(ids).await
    }

    async fn upsert_many(&self, documents: &[Document]) -> Result<usize> {
        self.inner.upsert_many(documents).await
    }
}
