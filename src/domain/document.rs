//! Document model
//!
//! A document is a JSON object with a required `_id` field. Field locations
//! inside a document are described by [`FieldPath`], a sequence of object keys
//! and array indices relative to the root.

use crate::domain::errors::PhimaskError;
use crate::domain::ids::{type_name, DocumentId};
use crate::domain::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the required identifier field
pub const ID_FIELD: &str = "_id";

/// Reserved metadata field marking a document as already masked
pub const MASK_MARKER_FIELD: &str = "_phimask";

/// One step of a concrete field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Concrete root-relative location of a value inside a document
///
/// # Examples
///
/// ```
/// use phimask::domain::document::FieldPath;
///
/// let mut path = FieldPath::new();
/// path.push_key("Phones");
/// path.push_index(0);
/// path.push_key("Number");
/// assert_eq!(path.to_string(), "Phones.0.Number");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Creates an empty (root) path
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an object key
    pub fn push_key(&mut self, key: impl Into<String>) {
        self.0.push(PathSegment::Key(key.into()));
    }

    /// Appends an array index
    pub fn push_index(&mut self, index: usize) {
        self.0.push(PathSegment::Index(index));
    }

    /// Removes the last segment
    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// Returns the segments of this path
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(|s| PathSegment::Key(s.into())).collect())
    }
}

/// A document read from or written to a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    body: Map<String, Value>,
}

impl Document {
    /// Builds a document from an arbitrary JSON value
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::MalformedDocument` if the root is not an object
    /// or the `_id` field is missing or unusable.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(body) => Self::from_map(body),
            other => Err(PhimaskError::malformed(
                None,
                format!("document root must be an object, got {}", type_name(&other)),
            )),
        }
    }

    /// Builds a document from a JSON object
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::MalformedDocument` if the `_id` field is missing
    /// or unusable.
    pub fn from_map(body: Map<String, Value>) -> Result<Self> {
        let raw = body
            .get(ID_FIELD)
            .ok_or_else(|| PhimaskError::malformed(None, format!("missing {ID_FIELD} field")))?;
        let id = DocumentId::from_value(raw)
            .map_err(|reason| PhimaskError::malformed(Some(raw.to_string()), reason))?;
        Ok(Self { id, body })
    }

    /// Returns the document identifier
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the document fields, including `_id`
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Consumes the document and returns its fields
    pub fn into_body(self) -> Map<String, Value> {
        self.body
    }

    /// Consumes the document and returns it as a JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    /// Looks up a value by dotted path (`"Address.Lines.0"`)
    ///
    /// Numeric segments index into arrays. Returns `None` if any step is
    /// absent.
    pub fn lookup(&self, dotted: &str) -> Option<&Value> {
        let mut segments = dotted.split('.');
        let first = segments.next()?;
        let mut current = self.body.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Whether the reserved marker says this document was already masked
    pub fn is_marked_masked(&self) -> bool {
        matches!(self.body.get(MASK_MARKER_FIELD), Some(Value::Bool(true)))
    }

    /// Stamps the reserved marker on this document
    pub fn mark_masked(&mut self) {
        self.body
            .insert(MASK_MARKER_FIELD.to_string(), Value::Bool(true));
    }
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.body.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let body = Map::<String, Value>::deserialize(deserializer)?;
        Document::from_map(body).map_err(serde::de::Error::custom)
    }
}
