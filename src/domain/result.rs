//! Result type alias for phimask
//!
//! This module provides a convenient Result type alias that uses PhimaskError
//! as the error type.

use super::errors::PhimaskError;

/// Result type alias for phimask operations
///
/// # Examples
///
/// ```
/// use phimask::domain::result::Result;
/// use phimask::domain::errors::PhimaskError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(PhimaskError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, PhimaskError>;
