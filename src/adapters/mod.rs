//! Store backends for phimask.
//!
//! - [`database`] - store traits and the factory building a run's stores
//! - [`postgresql`] - JSONB collections and the checkpoint table
//! - [`filesystem`] - JSON file checkpoints
//! - [`memory`] - in-memory collections and checkpoints
//!
//! # Example
//!
//! ```rust
//! use phimask::adapters::database::{CollectionQuery, DocumentStore};
//! use phimask::adapters::memory::InMemoryCollection;
//! use serde_json::json;
//!
//! # async fn example() -> phimask::domain::Result<()> {
//! let store = InMemoryCollection::with_documents(
//!     "patients",
//!     vec![json!({"_id": 1, "FirstName": "Jo"})],
//! )?;
//! assert_eq!(store.count(&CollectionQuery::all()).await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod filesystem;
pub mod memory;
pub mod postgresql;
