//! Verification logic for post-run validation
//!
//! Samples source documents, fetches their masked counterparts by id and
//! checks that PHI fields changed while preserved fields did not.

use crate::adapters::database::traits::{CollectionQuery, DocumentStore, StoredRecord};
use crate::config::schema::{RetryConfig, VerificationConfig};
use crate::core::pipeline::retry::RetryPolicy;
use crate::core::verification::report::{
    FieldCheckKind, SampleMismatch, VerificationReport, VerificationResult,
};
use crate::domain::document::Document;
use crate::domain::ids::DocumentId;
use crate::domain::{PhimaskError, Result};
use crate::masking::audit::value_hash;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Page size of the ordered scan behind random sampling
const SCAN_PAGE_SIZE: usize = 500;

/// How source documents are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingStrategy {
    /// First N documents by id
    #[default]
    First,
    /// Uniform reservoir sample over the whole selection
    Random,
}

impl FromStr for SamplingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first" => Ok(SamplingStrategy::First),
            "random" => Ok(SamplingStrategy::Random),
            other => Err(format!(
                "Invalid sampling '{other}'. Must be 'first' or 'random'"
            )),
        }
    }
}

/// Verifier for post-run validation
pub struct Verifier {
    source: Arc<dyn DocumentStore>,
    destination: Arc<dyn DocumentStore>,
    phi_fields: Vec<String>,
    preserved_fields: Vec<String>,
    max_sample_mismatches: usize,
    strategy: SamplingStrategy,
    filter: Option<Value>,
    retry: RetryPolicy,
    seed: Option<u64>,
}

impl Verifier {
    /// Create a new verifier
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::Configuration` for an unknown sampling strategy.
    pub fn new(
        source: Arc<dyn DocumentStore>,
        destination: Arc<dyn DocumentStore>,
        config: &VerificationConfig,
    ) -> Result<Self> {
        let strategy = config
            .sampling
            .parse::<SamplingStrategy>()
            .map_err(PhimaskError::Configuration)?;

        Ok(Self {
            source,
            destination,
            phi_fields: config.phi_fields.clone(),
            preserved_fields: config.preserved_fields.clone(),
            max_sample_mismatches: config.max_sample_mismatches,
            strategy,
            filter: None,
            retry: RetryPolicy::from_config(&RetryConfig::default()),
            seed: None,
        })
    }

    /// Override the sampling strategy
    pub fn with_strategy(mut self, strategy: SamplingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Restrict sampling to documents matching a containment filter
    pub fn with_filter(mut self, filter: Option<Value>) -> Self {
        self.filter = filter;
        self
    }

    /// Retry policy for store reads
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fix the random sampling seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Verify up to `sample_size` source documents against the destination
    ///
    /// # Errors
    ///
    /// Only store failures are errors; every finding is part of the report.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use phimask::adapters::memory::InMemoryCollection;
    /// use phimask::config::VerificationConfig;
    /// use phimask::core::verification::Verifier;
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let source = Arc::new(InMemoryCollection::new("patients"));
    /// let destination = Arc::new(InMemoryCollection::new("patients_masked"));
    /// let config = VerificationConfig {
    ///     phi_fields: vec!["FirstName".to_string()],
    ///     ..VerificationConfig::default()
    /// };
    /// let report = Verifier::new(source, destination, &config)?.verify(100).await?;
    /// println!("{}", report.format_summary());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn verify(&self, sample_size: usize) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::new();

        tracing::info!(
            source = self.source.name(),
            destination = self.destination.name(),
            sample_size,
            strategy = ?self.strategy,
            "Starting post-run verification"
        );

        let sample = match self.strategy {
            SamplingStrategy::First => self.sample_first(sample_size).await?,
            SamplingStrategy::Random => self.sample_random(sample_size).await?,
        };
        report.documents_sampled = sample.len();

        let ids: Vec<DocumentId> = sample.iter().map(|d| d.id().clone()).collect();
        let fetched = self
            .retry
            .run("fetch_many", || self.destination.fetch_many(&ids))
            .await?;
        let mut masked: HashMap<DocumentId, Document> = HashMap::with_capacity(fetched.len());
        for record in fetched {
            if let Some(document) = to_document(record) {
                masked.insert(document.id().clone(), document);
            }
        }

        let mut results: Vec<VerificationResult> = self
            .phi_fields
            .iter()
            .map(|f| VerificationResult::new(f.as_str(), FieldCheckKind::Phi))
            .chain(
                self.preserved_fields
                    .iter()
                    .map(|f| VerificationResult::new(f.as_str(), FieldCheckKind::Preserved)),
            )
            .collect();

        for original in &sample {
            let Some(copy) = masked.get(original.id()) else {
                report.missing_documents += 1;
                tracing::debug!(id = %original.id(), "Sampled document missing from destination");
                continue;
            };
            report.documents_compared += 1;

            for result in &mut results {
                self.check_field(result, original, copy);
            }
        }

        report.results = results;
        report.set_duration(start.elapsed().as_millis() as u64);

        tracing::info!(
            sampled = report.documents_sampled,
            compared = report.documents_compared,
            missing = report.missing_documents,
            failures = report.total_failures(),
            success_rate = format!("{:.2}%", report.success_rate()),
            duration_ms = report.duration_ms,
            "Verification completed"
        );

        Ok(report)
    }

    fn check_field(&self, result: &mut VerificationResult, original: &Document, copy: &Document) {
        let Some(before) = original.lookup(&result.field_name) else {
            return;
        };
        let after = copy.lookup(&result.field_name);

        let failed = match result.kind {
            FieldCheckKind::Phi => {
                if before.is_null() {
                    return;
                }
                if values_differ(before, after) {
                    result.masked_count += 1;
                    false
                } else {
                    result.unmasked_count += 1;
                    true
                }
            }
            FieldCheckKind::Preserved => {
                if after == Some(before) {
                    result.preserved_count += 1;
                    false
                } else {
                    result.violated_count += 1;
                    true
                }
            }
        };

        if failed {
            let value_hash = after.map(value_hash).unwrap_or_else(|| "-".to_string());
            result.record_mismatch(
                SampleMismatch {
                    document_id: copy.id().to_string(),
                    value_hash,
                },
                self.max_sample_mismatches,
            );
        }
    }

    async fn sample_first(&self, sample_size: usize) -> Result<Vec<Document>> {
        if sample_size == 0 {
            return Ok(Vec::new());
        }
        let query = CollectionQuery::filtered(self.filter.clone());
        let records = self
            .retry
            .run("read_range", || self.source.read_range(&query, sample_size))
            .await?;
        Ok(records.into_iter().filter_map(to_document).collect())
    }

    async fn sample_random(&self, sample_size: usize) -> Result<Vec<Document>> {
        if sample_size == 0 {
            return Ok(Vec::new());
        }
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut reservoir: Vec<Document> = Vec::with_capacity(sample_size);
        let mut seen = 0usize;
        let mut query = CollectionQuery::filtered(self.filter.clone());

        loop {
            let page = self
                .retry
                .run("read_range", || self.source.read_range(&query, SCAN_PAGE_SIZE))
                .await?;
            let Some(last) = page.last().map(|r| r.id.clone()) else {
                break;
            };
            let exhausted = page.len() < SCAN_PAGE_SIZE;

            for document in page.into_iter().filter_map(to_document) {
                seen += 1;
                if reservoir.len() < sample_size {
                    reservoir.push(document);
                } else {
                    let slot = rng.gen_range(0..seen);
                    if slot < sample_size {
                        reservoir[slot] = document;
                    }
                }
            }

            if exhausted {
                break;
            }
            query = query.after(Some(last));
        }

        reservoir.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(reservoir)
    }
}

fn to_document(record: StoredRecord) -> Option<Document> {
    match Document::from_value(record.raw) {
        Ok(document) => Some(document),
        Err(e) => {
            tracing::debug!(id = %record.id, error = %e, "Skipping malformed document");
            None
        }
    }
}

/// Type-tolerant inequality: a changed type or an emptied string counts as
/// different
fn values_differ(before: &Value, after: Option<&Value>) -> bool {
    let Some(after) = after else {
        return true;
    };
    match (before, after) {
        (_, Value::String(s)) if s.is_empty() => true,
        (Value::Number(a), Value::Number(b)) => numbers_differ(a, b),
        (a, b) if mem::discriminant(a) != mem::discriminant(b) => true,
        (a, b) => a != b,
    }
}

fn numbers_differ(a: &Number, b: &Number) -> bool {
    if a.is_f64() || b.is_f64() {
        return a.as_f64() != b.as_f64();
    }
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x != y,
        _ => a.as_u64() != b.as_u64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCollection;
    use serde_json::json;
    use test_case::test_case;

    fn config(phi: &[&str], preserved: &[&str]) -> VerificationConfig {
        VerificationConfig {
            phi_fields: phi.iter().map(|s| s.to_string()).collect(),
            preserved_fields: preserved.iter().map(|s| s.to_string()).collect(),
            ..VerificationConfig::default()
        }
    }

    #[test_case(json!("John"), Some(json!("XKQP")), true ; "changed string")]
    #[test_case(json!("John"), Some(json!("John")), false ; "same string")]
    #[test_case(json!("John"), Some(json!("")), true ; "emptied string")]
    #[test_case(json!(42), Some(json!("42")), true ; "type changed")]
    #[test_case(json!(1), Some(json!(1.0)), false ; "numerically equal")]
    #[test_case(json!(9007199254740993i64), Some(json!(9007199254740992i64)), true ; "large integers changed")]
    #[test_case(json!(u64::MAX), Some(json!(u64::MAX - 1)), true ; "large unsigned changed")]
    #[test_case(json!(-5), Some(json!(u64::MAX)), true ; "signed versus unsigned")]
    #[test_case(json!("a"), None, true ; "field gone")]
    fn test_values_differ(before: Value, after: Option<Value>, expected: bool) {
        assert_eq!(values_differ(&before, after.as_ref()), expected);
    }

    #[tokio::test]
    async fn test_gender_masked_is_reported_masked() {
        let source = Arc::new(
            InMemoryCollection::with_documents("src", vec![json!({"_id": 4, "Gender": "F"})])
                .unwrap(),
        );
        let destination = Arc::new(
            InMemoryCollection::with_documents("dst", vec![json!({"_id": 4, "Gender": "xxxxxx"})])
                .unwrap(),
        );

        let report = Verifier::new(source, destination, &config(&["Gender"], &[]))
            .unwrap()
            .verify(10)
            .await
            .unwrap();

        let gender = report.result_for("Gender").unwrap();
        assert_eq!(gender.masked_count, 1);
        assert_eq!(gender.unmasked_count, 0);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_unmasked_and_violations_are_sampled_by_id() {
        let source = Arc::new(
            InMemoryCollection::with_documents(
                "src",
                vec![
                    json!({"_id": 1, "Name": "Ann", "Status": "active"}),
                    json!({"_id": 2, "Name": "Bob", "Status": "active"}),
                    json!({"_id": 3, "Name": null, "Status": "inactive"}),
                ],
            )
            .unwrap(),
        );
        let destination = Arc::new(
            InMemoryCollection::with_documents(
                "dst",
                vec![
                    json!({"_id": 1, "Name": "Ann", "Status": "active"}),
                    json!({"_id": 2, "Name": "QWE", "Status": "changed"}),
                ],
            )
            .unwrap(),
        );

        let report = Verifier::new(source, destination, &config(&["Name"], &["Status"]))
            .unwrap()
            .verify(10)
            .await
            .unwrap();

        assert_eq!(report.documents_sampled, 3);
        assert_eq!(report.missing_documents, 1);

        let name = report.result_for("Name").unwrap();
        assert_eq!((name.masked_count, name.unmasked_count), (1, 1));
        assert_eq!(name.sample_mismatches[0].document_id, "1");
        assert_ne!(name.sample_mismatches[0].value_hash, "Ann");

        let status = report.result_for("Status").unwrap();
        assert_eq!((status.preserved_count, status.violated_count), (1, 1));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_random_sampling_is_bounded_and_sorted() {
        let docs: Vec<Value> = (0..1200).map(|i| json!({"_id": i, "Name": "n"})).collect();
        let source = Arc::new(InMemoryCollection::with_documents("src", docs).unwrap());
        let destination = Arc::new(InMemoryCollection::new("dst"));

        let report = Verifier::new(source.clone(), destination.clone(), &config(&["Name"], &[]))
            .unwrap()
            .with_strategy(SamplingStrategy::Random)
            .with_seed(7)
            .verify(25)
            .await
            .unwrap();

        assert_eq!(report.documents_sampled, 25);
        assert_eq!(report.missing_documents, 25);

        let sample = Verifier::new(source, destination, &config(&[], &[]))
            .unwrap()
            .with_seed(7)
            .sample_random(25)
            .await
            .unwrap();
        assert!(sample.windows(2).all(|w| w[0].id() < w[1].id()));
        assert!(sample.iter().any(|d| *d.id() > DocumentId::Int(500)));
    }

    #[test]
    fn test_unknown_sampling_is_configuration_error() {
        let cfg = VerificationConfig {
            sampling: "stratified".to_string(),
            ..VerificationConfig::default()
        };
        let store = Arc::new(InMemoryCollection::new("x"));
        let err = Verifier::new(store.clone(), store, &cfg).err().unwrap();
        assert!(err.is_configuration());
    }
}
