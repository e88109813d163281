//! Mask command implementation
//!
//! This module implements the `mask` command, which runs the masking
//! pipeline from the source collection into the destination.

use crate::cli::exit_code;
use crate::config::load_config;
use crate::core::pipeline::{Orchestrator, OrchestratorOutcome, RunOptions};
use crate::domain::PhimaskError;
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the mask command
#[derive(Args, Debug)]
pub struct MaskArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run mode - count, read and mask without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Continue after the last committed checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Override pipeline mode (full or incremental)
    #[arg(long)]
    pub mode: Option<String>,

    /// Verify a sample of documents after the run
    #[arg(long)]
    pub verify: bool,

    /// Override the number of masking workers
    #[arg(long)]
    pub workers: Option<usize>,
}

impl MaskArgs {
    /// Execute the mask command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting mask command");

        // Load configuration
        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };

        // Apply CLI overrides
        if let Some(mode) = &self.mode {
            tracing::info!(mode = %mode, "Overriding pipeline mode from CLI");
            config.pipeline.mode = mode.clone();
        }
        if let Some(workers) = self.workers {
            tracing::info!(workers, "Overriding worker count from CLI");
            config.pipeline.workers = workers;
        }
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if self.verify {
            config.pipeline.verify_after = true;
        }

        // Validate configuration
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(exit_code::CONFIGURATION);
        }

        let dry_run = config.application.dry_run;
        if dry_run {
            println!("🔍 DRY RUN MODE - No data will be written to the database");
            println!();
        }

        // Confirmation prompt (unless --yes or dry-run)
        if !self.yes && !dry_run {
            println!("Masking Configuration:");
            println!("  Source: {}", config.source.collection);
            println!(
                "  Destination: {}{}",
                config.destination_collection(),
                if config.in_place() { " (in place)" } else { "" }
            );
            println!("  Mode: {}", config.pipeline.mode);
            println!("  Resume: {}", self.resume);
            println!(
                "  Batch size: {} ({}-{})",
                config.batch.initial_size, config.batch.min_size, config.batch.max_size
            );
            println!("  Workers: {}", config.pipeline.workers);
            println!();
            print!("Proceed with masking? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Masking cancelled.");
                return Ok(exit_code::OK);
            }
        }

        let shutdown_timeout = Duration::from_secs(config.pipeline.shutdown_timeout_secs);

        let mut options = match RunOptions::from_config(&config) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return Ok(exit_code::CONFIGURATION);
            }
        };
        options.resume = self.resume;

        tracing::info!("Creating orchestrator");
        let orchestrator = match Orchestrator::from_config(config).await {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create orchestrator");
                eprintln!("Failed to initialize masking run: {e}");
                return Ok(setup_exit_code(&e));
            }
        };
        let mut orchestrator = orchestrator.with_options(options);

        println!("🚀 Starting masking run...");
        println!();

        // The timeout only applies once a shutdown signal has been received
        let mut signal = shutdown_signal.clone();
        let run = orchestrator.run(shutdown_signal);
        tokio::pin!(run);

        let outcome = tokio::select! {
            outcome = &mut run => outcome,
            _ = shutdown_deadline(&mut signal, shutdown_timeout) => {
                tracing::error!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Shutdown timeout exceeded, abandoning batch in flight"
                );
                eprintln!("⚠️  Shutdown timed out; the last committed checkpoint is still valid");
                return Ok(exit_code::INTERRUPTED);
            }
        };

        print_outcome(&outcome);
        Ok(run_exit_code(&outcome))
    }
}

async fn shutdown_deadline(signal: &mut watch::Receiver<bool>, timeout: Duration) {
    if signal.wait_for(|stop| *stop).await.is_err() {
        // Sender gone: no signal can arrive
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

fn setup_exit_code(error: &PhimaskError) -> i32 {
    if error.is_configuration() {
        exit_code::CONFIGURATION
    } else {
        exit_code::CONNECTION
    }
}

/// Exit code for a finished run
pub fn run_exit_code(outcome: &OrchestratorOutcome) -> i32 {
    match &outcome.error {
        Some(e) if e.is_configuration() => exit_code::CONFIGURATION,
        Some(PhimaskError::Connection(_)) => exit_code::CONNECTION,
        Some(_) => exit_code::FATAL,
        None if outcome.summary.interrupted => exit_code::INTERRUPTED,
        None if outcome.summary.is_successful() => exit_code::OK,
        None => exit_code::PARTIAL,
    }
}

fn print_outcome(outcome: &OrchestratorOutcome) {
    let summary = &outcome.summary;

    println!();
    println!("📊 Masking Summary:");
    println!("  Run ID: {}", summary.run_id);
    println!("  Final State: {}", summary.final_state);
    println!("  Eligible: {}", summary.total);
    println!("  Processed: {}", summary.processed);
    println!("  Masked: {} ({} fields)", summary.masked, summary.masked_fields);
    println!("  Written: {}", summary.written);
    println!("  Skipped (existing): {}", summary.skipped_existing);
    println!("  Skipped (errors): {}", summary.skipped_with_error);
    println!("  Not Found: {}", summary.not_found);
    println!("  Batches: {}", summary.batches);
    if let Some(resume_point) = &summary.resume_point {
        println!("  Resumed After: {resume_point}");
    }
    if let Some(last) = &summary.last_processed_id {
        println!("  Last Committed Id: {last}");
    }
    println!("  Duration: {:.2}s", summary.elapsed.as_secs_f64());
    println!("  Throughput: {:.1} docs/s", summary.throughput());
    println!();

    if let Some(report) = &summary.verification_report {
        println!("{}", report.format_summary());
    }

    if !summary.errors.is_empty() {
        println!("⚠️  Errors ({}):", summary.errors.len());
        for (i, error) in summary.errors.iter().enumerate() {
            if i < 10 {
                match &error.context {
                    Some(context) => println!("    - {} ({})", error.message, context),
                    None => println!("    - {}", error.message),
                }
            }
        }
        if summary.errors.len() > 10 {
            println!("    ... and {} more", summary.errors.len() - 10);
        }
        println!();
    }

    if summary.interrupted {
        println!("⚠️  Run interrupted. Resume with: phimask mask --resume");
    } else if let Some(e) = &outcome.error {
        println!("❌ Masking failed: {e}");
    } else if summary.is_successful() {
        println!("✅ Masking completed successfully");
    } else {
        println!("⚠️  Masking completed with warnings");
    }
}
