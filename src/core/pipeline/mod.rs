//! Masking pipeline orchestration
//!
//! This module provides the core run logic for phimask, including:
//! - Bounded retry of store calls
//! - Batch masking, optionally across worker threads
//! - Run orchestration and checkpointing
//! - Summary and reporting

pub mod batch;
pub mod coordinator;
pub mod retry;
pub mod summary;

pub use batch::{BatchMasker, BatchResult, SkippedDocument};
pub use coordinator::{Orchestrator, OrchestratorOutcome, PipelineMode, RunOptions};
pub use retry::RetryPolicy;
pub use summary::{PipelineState, RunError, RunErrorType, RunSummary};
