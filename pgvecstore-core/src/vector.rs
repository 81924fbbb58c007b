//! Vector types and their pgvector text encoding.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique identifier for a vector within an index.
pub type VectorId = String;

/// A dense vector of floating-point values.
///
/// Vectors travel to the database in pgvector's text form (`[1,2,3]`) and are
/// cast to the vector type inside the statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    /// Creates a new vector from a slice of f32 values.
    ///
    /// # Example
    ///
    /// ```
    /// use pgvecstore_core::Vector;
    ///
    /// let v = Vector::new(&[1.0, 2.0, 3.0]);
    /// assert_eq!(v.dimension(), 3);
    /// ```
    #[inline]
    pub fn new(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Creates a vector from an owned `Vec<f32>`.
    #[inline]
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Returns the dimension (length) of the vector.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Returns a slice view of the vector data.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns true if the vector has zero elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the vector, returning the underlying data.
    #[inline]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Checks the vector is non-empty and every component is finite.
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::InvalidVector("empty vector not allowed".into()));
        }
        if let Some(pos) = self.data.iter().position(|x| !x.is_finite()) {
            return Err(Error::InvalidVector(format!(
                "component {pos} is not a finite number"
            )));
        }
        Ok(())
    }

    /// Checks the vector is valid and has `expected` components.
    pub fn check_dimension(&self, index: &str, expected: u32) -> Result<()> {
        self.validate()?;
        if self.data.len() != expected as usize {
            return Err(Error::DimensionMismatch {
                index: index.to_string(),
                expected,
                actual: self.data.len() as u32,
            });
        }
        Ok(())
    }

    /// Encodes the vector in pgvector's text input format.
    pub fn to_pg_literal(&self) -> String {
        let mut out = String::with_capacity(self.data.len() * 8 + 2);
        out.push('[');
        for (i, x) in self.data.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{x}");
        }
        out.push(']');
        out
    }

    /// Parses pgvector's text output format.
    pub fn parse_pg_literal(text: &str) -> Result<Self> {
        let inner = text
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| Error::InvalidVector(format!("malformed vector literal {text:?}")))?;
        if inner.trim().is_empty() {
            return Ok(Self::from_vec(Vec::new()));
        }
        inner
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .map_err(|e| Error::InvalidVector(format!("bad component {part:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::from_vec)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[f32]> for Vector {
    fn from(data: &[f32]) -> Self {
        Self::new(data)
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}
