//! Post-run verification
//!
//! Samples documents and checks that PHI fields were masked and preserved
//! fields were left alone.

pub mod report;
pub mod verify;

pub use report::{FieldCheckKind, SampleMismatch, VerificationReport, VerificationResult};
pub use verify::{SamplingStrategy, Verifier};
