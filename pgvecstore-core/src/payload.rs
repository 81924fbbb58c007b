//! Metadata documents attached to vectors.
//!
//! A payload is a JSON object stored in the `metadata` JSONB column. Filters
//! address its fields by dotted path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Metadata payload attached to a vector.
///
/// # Example
///
/// ```
/// use pgvecstore_core::Payload;
///
/// let payload = Payload::new()
///     .with_field("source_id", "doc1.pdf")
///     .with_field("page", 3)
///     .with_field("tags", vec!["rust", "database"]);
///
/// assert_eq!(payload.get_str("source_id"), Some("doc1.pdf"));
/// assert_eq!(payload.get_path("page").and_then(|v| v.as_i64()), Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    data: Map<String, Value>,
}

impl Payload {
    /// Creates a new empty payload.
    #[inline]
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    /// Creates a payload from a JSON map.
    #[inline]
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Creates a payload from any JSON value; `null` becomes an empty payload.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            Value::Null => Ok(Self::new()),
            other => Err(Error::InvalidArgument(format!(
                "metadata must be a JSON object, got {other}"
            ))),
        }
    }

    /// Adds a field to the payload. Chainable.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets a field value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
    }

    /// Gets a top-level field value by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a top-level field as a string.
    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Follows a dotted path (`author.name`) through nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Returns true if the payload contains the given top-level key.
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the number of top-level fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the payload as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Returns the underlying map.
    #[inline]
    pub fn into_inner(self) -> Map<String, Value> {
        self.data
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(data: Map<String, Value>) -> Self {
        Self::from_map(data)
    }
}
