//! Core business logic for phimask.
//!
//! This module contains the orchestration of masking runs.
//!
//! # Modules
//!
//! - [`pipeline`] - Run orchestration, batch masking, retry and summaries
//! - [`resources`] - Host load sampling and adaptive batch sizing
//! - [`state`] - Checkpoints for resumable runs
//! - [`verification`] - Sampled comparison of source and masked documents
//!
//! # Run Workflow
//!
//! 1. **Load State**: Read the checkpoint, resuming after its cursor on request
//! 2. **Count**: Count eligible source documents
//! 3. **Read**: Fetch the next batch in identifier order
//! 4. **Mask**: Produce masked copies of every document in the batch
//! 5. **Write**: Upsert the batch into the destination
//! 6. **Checkpoint**: Advance the cursor after the write commits
//! 7. **Verify** (optional): Sample documents and compare fields
//! 8. **Report**: Produce the run summary
//!
//! # Example
//!
//! ```rust,no_run
//! use phimask::config::load_config;
//! use phimask::core::pipeline::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("phimask.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let mut orchestrator = Orchestrator::from_config(config).await?;
//! let outcome = orchestrator.run(shutdown_rx).await;
//!
//! println!("Processed: {}", outcome.summary.processed);
//! println!("Written: {}", outcome.summary.written);
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod resources;
pub mod state;
pub mod verification;
