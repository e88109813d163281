//! Status command implementation
//!
//! This module implements the `status` command for displaying run
//! checkpoints.

use crate::adapters::database::create_checkpoint_storage;
use crate::adapters::postgresql::PostgreSQLClient;
use crate::cli::exit_code;
use crate::config::load_config;
use crate::core::state::{CheckpointStatus, StateManager};
use clap::Args;
use std::sync::Arc;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show the checkpoint with this key
    #[arg(long)]
    pub key: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking run status");

        println!("📊 Masking Status");
        println!();

        // Load configuration
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {}", e);
                return Ok(exit_code::CONFIGURATION);
            }
        };

        let client = if config.state.backend == "postgresql" {
            match PostgreSQLClient::new(config.postgresql.clone()) {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    println!("❌ Invalid PostgreSQL settings");
                    println!("   Error: {}", e);
                    return Ok(exit_code::CONFIGURATION);
                }
            }
        } else {
            None
        };

        let storage = match create_checkpoint_storage(&config.state, client).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open checkpoint storage");
                println!("   Error: {}", e);
                return Ok(exit_code::CONNECTION);
            }
        };

        let state_manager = StateManager::new_with_storage(storage);

        let checkpoints = match state_manager.list().await {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load checkpoints");
                println!("   Error: {}", e);
                return Ok(exit_code::FATAL);
            }
        };

        if checkpoints.is_empty() {
            println!("No masking history found.");
            println!("Run 'phimask mask' to start masking data.");
            return Ok(exit_code::OK);
        }

        let filtered: Vec<_> = checkpoints
            .iter()
            .filter(|c| self.key.as_deref().map_or(true, |key| c.key.as_str() == key))
            .collect();

        if filtered.is_empty() {
            println!("No checkpoints match the specified key.");
            return Ok(exit_code::OK);
        }

        println!("Found {} checkpoint(s):", filtered.len());
        println!();
        println!(
            "{:<40} {:<16} {:<12} {:<24} {:<20}",
            "Key", "Status", "Processed", "Last Id", "Updated"
        );
        println!("{}", "-".repeat(112));

        for checkpoint in filtered {
            let status = match checkpoint.status {
                CheckpointStatus::Completed => "✅ Completed",
                CheckpointStatus::InProgress => "🔄 In Progress",
                CheckpointStatus::Failed => "❌ Failed",
                CheckpointStatus::Interrupted => "⏸️  Interrupted",
                CheckpointStatus::NotStarted => "⏸️  Not Started",
            };

            let last_id = checkpoint
                .last_processed_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());

            println!(
                "{:<40} {:<16} {:<12} {:<24} {:<20}",
                checkpoint.key.as_str(),
                status,
                checkpoint.documents_processed,
                last_id,
                checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
            if checkpoint.is_resumable() {
                println!("{:<40} resumable with: phimask mask --resume", "");
            }
        }

        println!();
        Ok(exit_code::OK)
    }
}
