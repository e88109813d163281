//! Store abstraction layer
//!
//! Collections and checkpoints are reached through the [`DocumentStore`] and
//! [`CheckpointStorage`] traits so the pipeline runs the same against
//! PostgreSQL, files or memory.

pub mod factory;
pub mod traits;

pub use factory::{create_checkpoint_storage, create_run_stores, RunStores};
pub use traits::{json_contains, CheckpointStorage, CollectionQuery, DocumentStore, StoredRecord};
