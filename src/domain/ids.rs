//! Domain identifier types with validation
//!
//! This module provides the identifier types used across the pipeline.
//! Document identifiers are ordered so collections can be walked in
//! identifier order; the other types are validated newtype wrappers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Document identifier
///
/// The value of a document's `_id` field. Integer and string identifiers are
/// supported; integers order before strings, integers order numerically and
/// strings order bytewise.
///
/// # Examples
///
/// ```
/// use phimask::domain::ids::DocumentId;
/// use serde_json::json;
///
/// let id = DocumentId::from_value(&json!(42)).unwrap();
/// assert_eq!(id, DocumentId::Int(42));
/// assert!(DocumentId::Int(1_000) < DocumentId::Str("a".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    /// Integer identifier
    Int(i64),
    /// String identifier
    Str(String),
}

impl DocumentId {
    /// Reads an identifier from a JSON value
    ///
    /// # Arguments
    ///
    /// * `value` - The `_id` value of a document
    ///
    /// # Returns
    ///
    /// Returns `Err` for floats, out-of-range integers, empty strings and
    /// non-scalar values.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(DocumentId::Int)
                .ok_or_else(|| format!("identifier {n} is not a 64-bit integer")),
            Value::String(s) if s.trim().is_empty() => {
                Err("identifier cannot be empty".to_string())
            }
            Value::String(s) => Ok(DocumentId::Str(s.clone())),
            other => Err(format!("unsupported identifier type: {}", type_name(other))),
        }
    }

    /// Converts the identifier back into its JSON representation
    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Int(i) => Value::from(*i),
            DocumentId::Str(s) => Value::String(s.clone()),
        }
    }

    /// Returns a string whose bytewise order matches the identifier order
    ///
    /// Integers are offset into the unsigned range and zero-padded so that
    /// negative values sort before positive ones.
    pub fn sort_key(&self) -> String {
        match self {
            DocumentId::Int(i) => {
                let shifted = (*i as i128 - i64::MIN as i128) as u128;
                format!("0:{shifted:020}")
            }
            DocumentId::Str(s) => format!("1:{s}"),
        }
    }

    /// Parses a key produced by [`DocumentId::sort_key`]
    pub fn from_sort_key(key: &str) -> Result<Self, String> {
        if let Some(digits) = key.strip_prefix("0:") {
            let shifted: u128 = digits
                .parse()
                .map_err(|e| format!("invalid integer sort key '{key}': {e}"))?;
            let value = i128::try_from(shifted)
                .ok()
                .and_then(|v| v.checked_add(i64::MIN as i128))
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| format!("integer sort key '{key}' out of range"))?;
            Ok(DocumentId::Int(value))
        } else if let Some(s) = key.strip_prefix("1:") {
            Ok(DocumentId::Str(s.to_string()))
        } else {
            Err(format!("unrecognized sort key '{key}'"))
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{i}"),
            DocumentId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        DocumentId::Int(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        DocumentId::Str(value.to_string())
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Collection name newtype wrapper
///
/// Collection names become table names in SQL backends, so they are
/// restricted to ASCII letters, digits and underscores and must not start
/// with a digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    /// Creates a new CollectionName from a string
    ///
    /// # Arguments
    ///
    /// * `name` - The collection name
    ///
    /// # Returns
    ///
    /// Returns `Ok(CollectionName)` if the name is valid, `Err` otherwise
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.is_empty() {
            return Err("Collection name cannot be empty".to_string());
        }
        if name.len() > 63 {
            return Err(format!(
                "Collection name '{name}' exceeds 63 characters"
            ));
        }
        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "Invalid collection name '{name}'. Use letters, digits and underscores, not starting with a digit"
            ));
        }
        Ok(Self(name))
    }

    /// Returns the collection name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checkpoint key newtype wrapper
///
/// Identifies one resumable run lineage, typically `{source}__{destination}`.
/// Keys double as file names for the file checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey(String);

impl CheckpointKey {
    /// Creates a new CheckpointKey from a string
    ///
    /// # Arguments
    ///
    /// * `key` - The checkpoint key
    ///
    /// # Returns
    ///
    /// Returns `Ok(CheckpointKey)` if the key is valid, `Err` otherwise
    pub fn new(key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err("Checkpoint key cannot be empty".to_string());
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            || key.starts_with('.')
        {
            return Err(format!(
                "Invalid checkpoint key '{key}'. Use letters, digits, '_', '-' or '.'"
            ));
        }
        Ok(Self(key))
    }

    /// Derives the default key for a source/destination pair
    pub fn for_collections(source: &CollectionName, destination: &CollectionName) -> Self {
        Self(format!("{}__{}", source.as_str(), destination.as_str()))
    }

    /// Returns the checkpoint key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CheckpointKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh run identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RunId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
