//! PostgreSQL integration
//!
//! Collections are JSONB tables keyed by an order-preserving text key;
//! checkpoints live in the `phimask_checkpoints` table.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::{PostgreSQLCheckpointStore, PostgreSQLCollection};
pub use client::PostgreSQLClient;
pub use models::PostgreSQLCheckpoint;
