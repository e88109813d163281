//! Store abstraction traits
//!
//! This module defines the traits that collection and checkpoint backends
//! must implement to work with phimask.

use crate::core::state::checkpoint::Checkpoint;
use crate::domain::document::{Document, ID_FIELD};
use crate::domain::ids::{CheckpointKey, DocumentId};
use crate::domain::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Selection over a collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionQuery {
    /// JSON containment filter; a document matches if it contains every
    /// key/value of the filter (recursively for objects)
    pub filter: Option<Value>,

    /// Only documents with an id strictly greater than this one
    pub after: Option<DocumentId>,
}

impl CollectionQuery {
    /// Query over the whole collection
    pub fn all() -> Self {
        Self::default()
    }

    /// Query with an optional containment filter
    pub fn filtered(filter: Option<Value>) -> Self {
        Self {
            filter,
            after: None,
        }
    }

    /// Returns a copy starting after the given id
    pub fn after(&self, after: Option<DocumentId>) -> Self {
        Self {
            filter: self.filter.clone(),
            after,
        }
    }

    /// Query for one document by id
    pub fn by_id(id: &DocumentId) -> Self {
        let mut filter = Map::new();
        filter.insert(ID_FIELD.to_string(), id.to_value());
        Self {
            filter: Some(Value::Object(filter)),
            after: None,
        }
    }
}

/// A raw record read from a store
///
/// The body is not validated; callers turn it into a [`Document`] and treat
/// failures as malformed documents.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Id the store ordered this record by
    pub id: DocumentId,
    /// Stored JSON
    pub raw: Value,
}

/// Document collection trait
///
/// Every method is a suspension point; implementations must be safe to call
/// from multiple tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Collection name, for logging
    fn name(&self) -> &str;

    /// Create the backing storage if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be created.
    async fn ensure_collection(&self) -> Result<()>;

    /// Count documents matching the query
    async fn count(&self, query: &CollectionQuery) -> Result<u64>;

    /// Read up to `limit` records matching the query, ordered by id,
    /// strictly after `query.after`
    async fn read_range(&self, query: &CollectionQuery, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Return the subset of `ids` present in the collection
    async fn existing_ids(&self, ids: &[DocumentId]) -> Result<HashSet<DocumentId>>;

    /// Insert or replace documents by id
    ///
    /// The batch is applied atomically: either every document is written or
    /// none is.
    ///
    /// # Returns
    ///
    /// Returns the number of documents written.
    async fn upsert_many(&self, documents: &[Document]) -> Result<usize>;

    /// Fetch documents by id, skipping ids that do not exist
    ///
    /// The default implementation issues one filtered read per id.
    async fn fetch_many(&self, ids: &[DocumentId]) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let mut found = self.read_range(&CollectionQuery::by_id(id), 1).await?;
            records.append(&mut found);
        }
        Ok(records)
    }
}

/// Checkpoint storage trait
///
/// This trait defines the interface for storing and retrieving checkpoints
/// that track the progress of masking runs.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Load a checkpoint from storage
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(Checkpoint))` if found, `Ok(None)` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails for reasons other than "not found".
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>>;

    /// Save a checkpoint durably, replacing any previous one with the same key
    ///
    /// # Errors
    ///
    /// Returns an error if the save operation fails.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Get all checkpoints from storage
    async fn list(&self) -> Result<Vec<Checkpoint>>;
}

/// Whether `doc` contains every key/value of `filter`
///
/// Objects match recursively. Arrays match when every element of the filter
/// array is contained in some element of the document array. Other values
/// must be equal.
pub fn json_contains(doc: &Value, filter: &Value) -> bool {
    match (doc, filter) {
        (Value::Object(doc), Value::Object(filter)) => filter.iter().all(|(key, expected)| {
            doc.get(key)
                .is_some_and(|actual| json_contains(actual, expected))
        }),
        (Value::Array(doc), Value::Array(filter)) => filter
            .iter()
            .all(|expected| doc.iter().any(|actual| json_contains(actual, expected))),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (actual, expected) => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!({"a": 1, "b": 2}), json!({"a": 1}), true ; "subset of keys")]
    #[test_case(json!({"a": 1}), json!({"a": 2}), false ; "different value")]
    #[test_case(json!({"a": 1}), json!({"b": 1}), false ; "missing key")]
    #[test_case(json!({"a": {"x": 1, "y": 2}}), json!({"a": {"y": 2}}), true ; "nested object")]
    #[test_case(json!({"tags": ["a", "b"]}), json!({"tags": ["b"]}), true ; "array subset")]
    #[test_case(json!({"tags": ["a"]}), json!({"tags": ["c"]}), false ; "array mismatch")]
    #[test_case(json!({"n": 1.0}), json!({"n": 1}), true ; "numeric equality")]
    #[test_case(json!({"a": 1}), json!({}), true ; "empty filter")]
    fn test_json_contains(doc: Value, filter: Value, expected: bool) {
        assert_eq!(json_contains(&doc, &filter), expected);
    }

    #[test]
    fn test_query_helpers() {
        let base = CollectionQuery::filtered(Some(json!({"active": true})));
        let next = base.after(Some(DocumentId::Int(5)));
        assert_eq!(next.filter, base.filter);
        assert_eq!(next.after, Some(DocumentId::Int(5)));

        let by_id = CollectionQuery::by_id(&DocumentId::from("x"));
        assert_eq!(by_id.filter, Some(json!({"_id": "x"})));
    }
}
