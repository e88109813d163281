//! Masking engine for phimask
//!
//! This module turns a rule catalog into masked document copies.
//!
//! # Architecture
//!
//! - **Matcher**: dotted field patterns with single-segment wildcards
//! - **Rules**: typed rule definitions and the immutable [`RuleSet`]
//! - **Engine**: per-value transformations (names, sentinels, digits, dates)
//! - **Masker**: recursive walk producing a structurally identical copy
//! - **Audit**: single-writer log of committed batches
//!
//! # Usage
//!
//! ```rust
//! use phimask::masking::{DocumentMasker, RuleDefinition, RuleSet};
//! use serde_json::json;
//!
//! let rules = RuleSet::from_definitions(&[RuleDefinition::new("Email", "email_mask")]).unwrap();
//! let masker = DocumentMasker::from_rules(rules);
//! let outcome = masker.mask_value(json!({"_id": 1, "Email": "jo@example.org"})).unwrap();
//! assert_eq!(outcome.document.body()["Email"], json!("xxxxxx@xxxx.com"));
//! ```

pub mod audit;
pub mod engine;
pub mod masker;
pub mod matcher;
pub mod rules;

pub use audit::{AuditLogger, AuditRecord};
pub use engine::RuleEngine;
pub use masker::{DocumentMasker, MaskOutcome};
pub use matcher::FieldPattern;
pub use rules::{MaskingRule, RuleDefinition, RuleKind, RuleSet};
