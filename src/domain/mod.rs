//! Domain models and types for phimask.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Identifiers** ([`DocumentId`], [`CollectionName`], [`CheckpointKey`], [`RunId`])
//! - **Documents** ([`Document`], [`FieldPath`])
//! - **Error types** ([`PhimaskError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, PhimaskError>`]:
//!
//! ```rust
//! use phimask::domain::{Document, Result};
//! use serde_json::json;
//!
//! fn example() -> Result<()> {
//!     let doc = Document::from_value(json!({"_id": 1, "FirstName": "Jo"}))?;
//!     assert_eq!(doc.id().to_string(), "1");
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod errors;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use document::{Document, FieldPath, PathSegment, ID_FIELD, MASK_MARKER_FIELD};
pub use errors::PhimaskError;
pub use ids::{CheckpointKey, CollectionName, DocumentId, RunId};
pub use result::Result;
