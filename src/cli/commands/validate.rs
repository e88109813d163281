//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the phimask configuration file and its rule set.

use crate::adapters::postgresql::client::redact_connection_string;
use crate::cli::exit_code;
use crate::config::load_config;
use crate::masking::RuleSet;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // Loading runs validation of every section
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded and validated");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        let rules = match RuleSet::load(config.masking.rules_file.as_deref(), &config.masking.rules) {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Rule set is invalid");
                println!("   Error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };
        println!("✅ Rule set parsed ({} rules)", rules.len());
        println!();

        let server =
            redact_connection_string(config.postgresql.connection_string.expose_secret().as_ref());

        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  PostgreSQL: {server}");
        println!("  Max Connections: {}", config.postgresql.max_connections);
        println!("  Source: {}", config.source.collection);
        println!(
            "  Destination: {}{}",
            config.destination_collection(),
            if config.in_place() { " (in place)" } else { "" }
        );
        println!("  Mode: {}", config.pipeline.mode);
        println!("  Workers: {}", config.pipeline.workers);
        println!(
            "  Batch Size: {} ({}-{})",
            config.batch.initial_size, config.batch.min_size, config.batch.max_size
        );
        println!(
            "  Resource Monitoring: {}",
            if config.resources.enabled { "enabled" } else { "disabled" }
        );
        println!("  State Backend: {}", config.state.backend);
        println!();

        if rules.is_empty() {
            println!("⚠️  No masking rules configured; documents will be copied unchanged");
        } else {
            println!("Masking Rules:");
            for rule in rules.rules() {
                println!("  {} -> {}", rule.pattern().as_str(), rule.kind().name());
            }
        }
        println!();
        Ok(exit_code::OK)
    }
}
