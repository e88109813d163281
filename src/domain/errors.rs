//! Domain error types
//!
//! This module defines the error hierarchy for phimask.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main phimask error type
///
/// This is the primary error type used throughout the application. The
/// variants follow the failure taxonomy of a masking run: configuration
/// problems are fatal before processing starts, transient store errors are
/// retried, malformed documents are skipped and a run failure stops the run
/// with the last committed checkpoint intact.
#[derive(Debug, Error)]
pub enum PhimaskError {
    /// Missing or invalid configuration, rule set or connection parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeouts, connection drops or write conflicts against a store
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// A document that cannot be traversed or lacks a usable identifier
    #[error("Malformed document {}: {reason}", .id.as_deref().unwrap_or("<unknown>"))]
    MalformedDocument {
        /// Identifier of the document, when one could be read
        id: Option<String>,
        /// What was wrong with the document
        reason: String,
    },

    /// Retry budget or checkpoint write exhausted
    #[error("Run failure: {0}")]
    RunFailure(String),

    /// Non-retryable database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Network/connection errors while establishing a session
    #[error("Connection error: {0}")]
    Connection(String),

    /// Checkpoint state errors
    #[error("State management error: {0}")]
    State(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl PhimaskError {
    /// Creates a malformed document error
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier of the offending document, if known
    /// * `reason` - Description of the problem
    pub fn malformed(id: Option<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            id,
            reason: reason.into(),
        }
    }

    /// Whether the operation that produced this error may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::Connection(_))
    }

    /// Whether this error must stop processing before any batch runs
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PhimaskError {
    fn from(err: std::io::Error) -> Self {
        PhimaskError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PhimaskError {
    fn from(err: serde_json::Error) -> Self {
        PhimaskError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for PhimaskError {
    fn from(err: toml::de::Error) -> Self {
        PhimaskError::Configuration(format!("TOML parse error: {err}"))
    }
}
