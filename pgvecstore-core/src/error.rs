//! Error types for pgvecstore operations.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Result type alias using pgvecstore's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE raised by PostgreSQL when the role lacks a privilege.
const INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE raised for a missing relation.
const UNDEFINED_TABLE: &str = "42P01";

/// pgvector reports dimension failures as `expected 3 dimensions, not 4`.
static DIMENSION_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"expected (\d+) dimensions, not (\d+)").expect("static regex is valid")
});

/// Errors that can occur during pgvecstore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Index name does not satisfy the identifier rules.
    #[error("invalid index name {0:?}: names must match [A-Za-z_][A-Za-z0-9_]* and be at most 63 bytes")]
    InvalidIndexName(String),

    /// Dimension of zero (or one pgvector cannot store).
    #[error("invalid dimension {0}: must be between 1 and 16000")]
    InvalidDimension(u32),

    /// Vector contained a non-finite component or was empty.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Vector dimension mismatch between index and input.
    #[error("dimension mismatch on index {index}: expected {expected}, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: u32,
        actual: u32,
    },

    /// Malformed filter expression.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Filter used an operator token that is not part of the filter language.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// `$not` was given nothing to negate.
    #[error("$not requires a non-empty operator map or filter")]
    EmptyNot,

    /// `delete_vectors_by_filter` was called without a predicate.
    #[error("refusing to delete with an empty filter on index {0}")]
    EmptyDeleteFilter(String),

    /// `update_vector` was called with neither a vector nor metadata.
    #[error("update for {id} on index {index} supplies neither a vector nor metadata")]
    EmptyUpdate { index: String, id: String },

    /// Any other malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The role lacks a privilege needed for the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The vector extension is missing or too old for the requested feature.
    #[error("vector extension unavailable: {0}")]
    ExtensionUnavailable(String),

    /// Index (table) does not exist or is not shaped like a managed index.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// Vector with the given id was not found.
    #[error("vector {id} not found in index {index}")]
    VectorNotFound { index: String, id: String },

    /// Existing index is incompatible with the requested definition.
    #[error("index conflict: {0}")]
    IndexConflict(String),

    /// Keyword or hybrid search against an index created without full-text.
    #[error("full-text search is not enabled on index {0}")]
    FullTextDisabled(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Re-expresses a database failure that happened while working on `index`.
    ///
    /// Dimension failures become [`Error::DimensionMismatch`], missing tables
    /// become [`Error::IndexNotFound`] and privilege failures become
    /// [`Error::Permission`]. Everything else stays [`Error::Database`].
    pub fn from_database(index: &str, err: sqlx::Error) -> Self {
        let Some(db) = err.as_database_error() else {
            return Error::Database(err);
        };

        if let Some(caps) = DIMENSION_MESSAGE.captures(db.message()) {
            let expected = caps[1].parse().unwrap_or_default();
            let actual = caps[2].parse().unwrap_or_default();
            return Error::DimensionMismatch {
                index: index.to_string(),
                expected,
                actual,
            };
        }

        match db.code().as_deref() {
            Some(INSUFFICIENT_PRIVILEGE) => Error::Permission(db.message().to_string()),
            Some(UNDEFINED_TABLE) => Error::IndexNotFound(index.to_string()),
            _ => Error::Database(err),
        }
    }

    /// Returns true for caller mistakes that no retry will fix.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidIndexName(_)
                | Error::InvalidDimension(_)
                | Error::InvalidVector(_)
                | Error::DimensionMismatch { .. }
                | Error::InvalidFilter(_)
                | Error::UnsupportedOperator(_)
                | Error::EmptyNot
                | Error::EmptyDeleteFilter(_)
                | Error::EmptyUpdate { .. }
                | Error::InvalidArgument(_)
                | Error::FullTextDisabled(_)
        )
    }

    /// Returns true when the error means the index or vector does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::IndexNotFound(_) | Error::VectorNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            index: "docs".into(),
            expected: 384,
            actual: 512,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch on index docs: expected 384, got 512"
        );
    }

    #[test]
    fn test_dimension_message_pattern() {
        let caps = DIMENSION_MESSAGE
            .captures("expected 3 dimensions, not 4")
            .unwrap();
        assert_eq!(&caps[1], "3");
        assert_eq!(&caps[2], "4");
    }

    #[test]
    fn test_non_database_error_passes_through() {
        let err = Error::from_database("docs", sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_classification() {
        assert!(Error::EmptyNot.is_validation());
        assert!(Error::IndexNotFound("x".into()).is_not_found());
        assert!(!Error::Permission("no".into()).is_validation());
    }
}
