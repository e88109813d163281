//! Batch masking
//!
//! Turns the raw records of one read into masked documents. With more than
//! one worker the batch is split into contiguous chunks masked on blocking
//! threads; output order always equals read order.

use crate::adapters::database::traits::StoredRecord;
use crate::domain::document::Document;
use crate::domain::ids::DocumentId;
use crate::domain::{PhimaskError, Result};
use crate::masking::masker::DocumentMasker;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A document that could not be masked
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    /// Id the store ordered the record by
    pub id: DocumentId,
    /// Why it was skipped
    pub reason: String,
}

/// Result of masking a batch
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Masked documents in read order
    pub documents: Vec<Document>,
    /// Fields replaced across the batch
    pub masked_fields: usize,
    /// Replacements per rule pattern
    pub rule_hits: BTreeMap<String, usize>,
    /// Malformed documents, skipped
    pub skipped: Vec<SkippedDocument>,
}

impl BatchResult {
    /// Create a new empty batch result
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a masked document
    pub fn add_success(
        &mut self,
        document: Document,
        masked_fields: usize,
        rule_hits: BTreeMap<String, usize>,
    ) {
        self.documents.push(document);
        self.masked_fields += masked_fields;
        for (pattern, hits) in rule_hits {
            *self.rule_hits.entry(pattern).or_default() += hits;
        }
    }

    /// Add a skipped document
    pub fn add_failure(&mut self, id: DocumentId, reason: String) {
        self.skipped.push(SkippedDocument { id, reason });
    }

    /// Merge the next chunk of the same batch into this one
    pub fn merge(&mut self, other: BatchResult) {
        self.documents.extend(other.documents);
        self.masked_fields += other.masked_fields;
        for (pattern, hits) in other.rule_hits {
            *self.rule_hits.entry(pattern).or_default() += hits;
        }
        self.skipped.extend(other.skipped);
    }
}

/// Masks batches of records
#[derive(Clone)]
pub struct BatchMasker {
    masker: Arc<DocumentMasker>,
    workers: usize,
    mark_masked: bool,
}

impl BatchMasker {
    /// Create a batch masker
    ///
    /// # Arguments
    ///
    /// * `masker` - Shared document masker
    /// * `workers` - Concurrent masking chunks per batch (1 = sequential)
    /// * `mark_masked` - Stamp the in-place marker on every masked document
    pub fn new(masker: Arc<DocumentMasker>, workers: usize, mark_masked: bool) -> Self {
        Self {
            masker,
            workers: workers.max(1),
            mark_masked,
        }
    }

    /// Mask a batch of records
    ///
    /// Malformed documents are logged and reported in
    /// [`BatchResult::skipped`]; they never fail the batch.
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::Other` if a masking thread panics.
    pub async fn mask(&self, records: Vec<StoredRecord>) -> Result<BatchResult> {
        if self.workers == 1 || records.len() < 2 {
            return Ok(mask_chunk(&self.masker, records, self.mark_masked));
        }

        let chunk_size = records.len().div_ceil(self.workers);
        let mut chunks = Vec::with_capacity(self.workers);
        let mut rest = records;
        while !rest.is_empty() {
            let tail = rest.split_off(chunk_size.min(rest.len()));
            chunks.push(std::mem::replace(&mut rest, tail));
        }

        tracing::debug!(
            chunks = chunks.len(),
            chunk_size,
            "Masking batch in parallel"
        );

        let handles = chunks.into_iter().map(|chunk| {
            let masker = self.masker.clone();
            let mark_masked = self.mark_masked;
            tokio::task::spawn_blocking(move || mask_chunk(&masker, chunk, mark_masked))
        });

        let parts = futures::future::try_join_all(handles)
            .await
            .map_err(|e| PhimaskError::Other(format!("Masking worker failed: {e}")))?;

        let mut result = BatchResult::new();
        for part in parts {
            result.merge(part);
        }
        Ok(result)
    }
}

fn mask_chunk(masker: &DocumentMasker, records: Vec<StoredRecord>, mark_masked: bool) -> BatchResult {
    let mut result = BatchResult::new();
    for record in records {
        let id = record.id;
        let masked = Document::from_value(record.raw).and_then(|doc| masker.mask(&doc));
        match masked {
            Ok(mut outcome) => {
                if mark_masked {
                    outcome.document.mark_masked();
                }
                result.add_success(outcome.document, outcome.masked_fields, outcome.rule_hits);
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Skipping malformed document");
                result.add_failure(id, e.to_string());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::rules::{RuleDefinition, RuleSet};
    use serde_json::{json, Value};

    fn masker() -> Arc<DocumentMasker> {
        let rules = RuleSet::from_definitions(&[RuleDefinition::new("Email", "email_mask")]).unwrap();
        Arc::new(DocumentMasker::from_rules(rules))
    }

    fn records(n: i64) -> Vec<StoredRecord> {
        (0..n)
            .map(|i| StoredRecord {
                id: DocumentId::Int(i),
                raw: json!({"_id": i, "Email": format!("user{i}@example.org")}),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_sequential_batch() {
        let result = BatchMasker::new(masker(), 1, false).mask(records(3)).await.unwrap();

        assert_eq!(result.documents.len(), 3);
        assert_eq!(result.masked_fields, 3);
        assert_eq!(result.rule_hits.get("Email"), Some(&3));
        assert!(result.documents.iter().all(|d| d.body()["Email"] == "xxxxxx@xxxx.com"));
        assert!(!result.documents[0].is_marked_masked());
    }

    #[tokio::test]
    async fn test_parallel_batch_keeps_read_order() {
        let result = BatchMasker::new(masker(), 4, false).mask(records(37)).await.unwrap();

        let ids: Vec<DocumentId> = result.documents.iter().map(|d| d.id().clone()).collect();
        let expected: Vec<DocumentId> = (0..37).map(DocumentId::Int).collect();
        assert_eq!(ids, expected);
        assert_eq!(result.masked_fields, 37);
    }

    #[tokio::test]
    async fn test_malformed_documents_are_skipped() {
        let mut batch = records(2);
        batch.insert(
            1,
            StoredRecord {
                id: DocumentId::from("broken"),
                raw: Value::Array(vec![]),
            },
        );

        let result = BatchMasker::new(masker(), 2, false).mask(batch).await.unwrap();
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].id, DocumentId::from("broken"));
    }

    #[tokio::test]
    async fn test_in_place_marker() {
        let result = BatchMasker::new(masker(), 1, true).mask(records(1)).await.unwrap();
        assert!(result.documents[0].is_marked_masked());
    }
}
