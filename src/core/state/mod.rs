//! Run state and checkpoint tracking

pub mod checkpoint;
pub mod manager;

pub use checkpoint::{Checkpoint, CheckpointBuilder, CheckpointStatus};
pub use manager::StateManager;
