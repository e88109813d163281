//! Verification report structures
//!
//! This module defines the structures for reporting verification results.
//! Reports carry counts, field paths and document ids; document values only
//! ever appear as short hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a field check asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCheckKind {
    /// The destination value must differ from the source
    Phi,
    /// The destination value must equal the source
    Preserved,
}

impl fmt::Display for FieldCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCheckKind::Phi => write!(f, "phi"),
            FieldCheckKind::Preserved => write!(f, "preserved"),
        }
    }
}

/// A document that failed a field check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMismatch {
    /// Identifier of the document
    pub document_id: String,
    /// Hash of the offending destination value
    pub value_hash: String,
}

/// Outcome of checking one field over the sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Dotted field path
    pub field_name: String,

    /// Check performed
    pub kind: FieldCheckKind,

    /// PHI values that differ from the source
    pub masked_count: usize,

    /// PHI values identical to the source
    pub unmasked_count: usize,

    /// Preserved values equal to the source
    pub preserved_count: usize,

    /// Preserved values that changed
    pub violated_count: usize,

    /// Up to the configured number of failing documents
    pub sample_mismatches: Vec<SampleMismatch>,
}

impl VerificationResult {
    /// Create an empty result for a field
    pub fn new(field_name: impl Into<String>, kind: FieldCheckKind) -> Self {
        Self {
            field_name: field_name.into(),
            kind,
            masked_count: 0,
            unmasked_count: 0,
            preserved_count: 0,
            violated_count: 0,
            sample_mismatches: Vec::new(),
        }
    }

    /// Number of documents that passed this check
    pub fn passed(&self) -> usize {
        self.masked_count + self.preserved_count
    }

    /// Number of documents that failed this check
    pub fn failed(&self) -> usize {
        self.unmasked_count + self.violated_count
    }

    /// Number of documents checked
    pub fn checked(&self) -> usize {
        self.passed() + self.failed()
    }

    pub(crate) fn record_mismatch(&mut self, mismatch: SampleMismatch, limit: usize) {
        if self.sample_mismatches.len() < limit {
            self.sample_mismatches.push(mismatch);
        }
    }
}

/// Verification report containing results of post-run validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// When the verification was performed
    pub verified_at: DateTime<Utc>,

    /// Source documents sampled
    pub documents_sampled: usize,

    /// Sampled documents found in the destination
    pub documents_compared: usize,

    /// Sampled documents missing from the destination
    pub missing_documents: usize,

    /// Per-field results, PHI fields first
    pub results: Vec<VerificationResult>,

    /// Duration of verification in milliseconds
    pub duration_ms: u64,
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationReport {
    /// Create a new verification report
    pub fn new() -> Self {
        Self {
            verified_at: Utc::now(),
            documents_sampled: 0,
            documents_compared: 0,
            missing_documents: 0,
            results: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Set the duration of verification
    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Result for a field, if it was checked
    pub fn result_for(&self, field_name: &str) -> Option<&VerificationResult> {
        self.results.iter().find(|r| r.field_name == field_name)
    }

    /// Total checks across all fields
    pub fn total_checks(&self) -> usize {
        self.results.iter().map(VerificationResult::checked).sum()
    }

    /// Total failed checks across all fields
    pub fn total_failures(&self) -> usize {
        self.results.iter().map(VerificationResult::failed).sum()
    }

    /// Check if every field check passed and no document is missing
    pub fn is_success(&self) -> bool {
        self.total_failures() == 0 && self.missing_documents == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            return 100.0;
        }
        let passed: usize = self.results.iter().map(VerificationResult::passed).sum();
        (passed as f64 / total as f64) * 100.0
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📊 Verification Report\n");
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Documents sampled: {}\n", self.documents_sampled));
        summary.push_str(&format!("  Documents compared: {}\n", self.documents_compared));
        summary.push_str(&format!("  ❓ Missing in destination: {}\n", self.missing_documents));
        summary.push_str(&format!("  Success rate: {:.2}%\n", self.success_rate()));

        if !self.results.is_empty() {
            summary.push_str("\n  Fields:\n");
        }
        for result in &self.results {
            let icon = if result.failed() == 0 { "✅" } else { "❌" };
            match result.kind {
                FieldCheckKind::Phi => summary.push_str(&format!(
                    "  {} {} (phi): masked={}, unmasked={}\n",
                    icon, result.field_name, result.masked_count, result.unmasked_count
                )),
                FieldCheckKind::Preserved => summary.push_str(&format!(
                    "  {} {} (preserved): preserved={}, violated={}\n",
                    icon, result.field_name, result.preserved_count, result.violated_count
                )),
            }
            for mismatch in &result.sample_mismatches {
                summary.push_str(&format!(
                    "      - {} (value hash {})\n",
                    mismatch.document_id, mismatch.value_hash
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phi(masked: usize, unmasked: usize) -> VerificationResult {
        VerificationResult {
            masked_count: masked,
            unmasked_count: unmasked,
            ..VerificationResult::new("FirstName", FieldCheckKind::Phi)
        }
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = VerificationReport::new();
        assert!(report.is_success());
        assert_eq!(report.success_rate(), 100.0);
    }

    #[test]
    fn test_success_rate_over_all_fields() {
        let mut report = VerificationReport::new();
        report.results.push(phi(3, 1));
        report.results.push(VerificationResult {
            preserved_count: 4,
            ..VerificationResult::new("Status", FieldCheckKind::Preserved)
        });

        assert_eq!(report.total_checks(), 8);
        assert_eq!(report.success_rate(), 87.5);
        assert!(!report.is_success());
    }

    #[test]
    fn test_missing_documents_fail_the_report() {
        let mut report = VerificationReport::new();
        report.results.push(phi(2, 0));
        report.missing_documents = 1;
        assert!(!report.is_success());
    }

    #[test]
    fn test_mismatch_samples_are_capped() {
        let mut result = phi(0, 0);
        for i in 0..5 {
            result.record_mismatch(
                SampleMismatch {
                    document_id: i.to_string(),
                    value_hash: "00".to_string(),
                },
                2,
            );
        }
        assert_eq!(result.sample_mismatches.len(), 2);
    }

    #[test]
    fn test_format_summary_lists_fields_without_values() {
        let mut report = VerificationReport::new();
        let mut result = phi(1, 1);
        result.record_mismatch(
            SampleMismatch {
                document_id: "p-7".to_string(),
                value_hash: "abcd".to_string(),
            },
            10,
        );
        report.results.push(result);

        let text = report.format_summary();
        assert!(text.contains("FirstName (phi): masked=1, unmasked=1"));
        assert!(text.contains("p-7 (value hash abcd)"));
    }

    #[test]
    fn test_report_serializes_kind_in_snake_case() {
        let mut report = VerificationReport::new();
        report.results.push(phi(1, 0));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["kind"], "phi");
        assert_eq!(json["missing_documents"], 0);
    }
}
