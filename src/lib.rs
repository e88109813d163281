// Phimask - PHI/PII masking pipeline
// Copyright (c) 2025 Phimask Contributors
// Licensed under the MIT License

//! # Phimask - PHI/PII masking pipeline
//!
//! Phimask copies a collection of JSON documents into a destination
//! collection (or back over itself) with protected health information
//! replaced by shape-preserving or constant masks.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Matching** dotted field patterns with `*` wildcards against nested documents
//! - **Masking** matched values with names, phone numbers, emails, dates and constants
//! - **Copying** documents in identifier order with adaptive batch sizes
//! - **Resuming** interrupted runs from a persisted checkpoint
//! - **Verifying** a sample of masked documents against their source
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pipeline orchestration, resources, state and verification
//! - [`masking`] - Field patterns, rule set and document masker
//! - [`adapters`] - Document and checkpoint stores (PostgreSQL, in-memory, files)
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phimask::config::load_config;
//! use phimask::core::pipeline::Orchestrator;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("phimask.toml")?;
//!     let mut orchestrator = Orchestrator::from_config(config).await?;
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let summary = orchestrator.run(shutdown_rx).await.into_result()?;
//!
//!     println!("Masked {} documents", summary.masked);
//!     Ok(())
//! }
//! ```
//!
//! ## Masking a single document
//!
//! ```rust
//! use phimask::domain::Document;
//! use phimask::masking::{DocumentMasker, RuleDefinition, RuleSet};
//! use serde_json::json;
//!
//! # fn example() -> phimask::domain::Result<()> {
//! let rules = RuleSet::load(None, &[RuleDefinition::new("Email", "email_mask")])?;
//! let masker = DocumentMasker::from_rules(rules);
//!
//! let doc = Document::from_value(json!({"_id": 1, "Email": "ann@example.com"}))?;
//! let outcome = masker.mask(&doc)?;
//! assert_ne!(outcome.document.lookup("Email"), doc.lookup("Email"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::Result`], built on
//! [`domain::PhimaskError`]. Transient store failures are retried by the
//! pipeline; malformed documents are skipped and counted.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod masking;

pub use config::PhimaskConfig;
pub use domain::{PhimaskError, Result};
