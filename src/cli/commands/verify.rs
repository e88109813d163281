//! Verify command implementation
//!
//! This module implements the `verify` command, which compares a sample of
//! source documents with their masked copies without running the pipeline.

use crate::adapters::database::create_run_stores;
use crate::cli::exit_code;
use crate::config::load_config;
use crate::core::pipeline::RetryPolicy;
use crate::core::verification::{SamplingStrategy, Verifier};
use clap::Args;

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Number of source documents to sample
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Sample uniformly at random instead of the first documents by id
    #[arg(long)]
    pub random: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyArgs {
    /// Execute the verify command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting verification");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("❌ Failed to load configuration file");
                eprintln!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        if config.in_place() {
            eprintln!("❌ Verification needs a destination collection distinct from the source");
            return Ok(exit_code::CONFIGURATION);
        }

        let stores = match create_run_stores(&config).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to connect to database");
                eprintln!("   Error: {e}");
                return Ok(exit_code::CONNECTION);
            }
        };

        let verifier = match Verifier::new(stores.source, stores.destination, &config.verification) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("❌ {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };
        let verifier = verifier
            .with_filter(config.pipeline.filter.clone())
            .with_retry(RetryPolicy::from_config(&config.retry));
        let verifier = if self.random {
            verifier.with_strategy(SamplingStrategy::Random)
        } else {
            verifier
        };

        let sample_size = self.sample_size.unwrap_or(config.verification.sample_size);
        let report = match verifier.verify(sample_size).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Verification failed");
                eprintln!("❌ Verification failed: {e}");
                return Ok(exit_code::FATAL);
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.format_summary());
        }

        if report.is_success() {
            Ok(exit_code::OK)
        } else {
            Ok(exit_code::PARTIAL)
        }
    }
}
