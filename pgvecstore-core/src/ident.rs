//! Identifier validation and quoting.
//!
//! Every identifier that ends up inside generated SQL (schema names, index
//! names, metadata field paths, text-search configurations) passes through
//! this module. Values never do: they are always bound parameters.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// PostgreSQL truncates identifiers longer than this.
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex is valid"));

static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("static regex is valid")
});

/// Returns true if `name` is safe to embed as an identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Validates an index (table) name.
pub fn validate_index_name(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::InvalidIndexName(name.to_string()))
    }
}

/// Validates a schema name.
pub fn validate_schema_name(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid schema name {name:?}")))
    }
}

/// Validates a text-search configuration name such as `english`.
pub fn validate_language(language: &str) -> Result<()> {
    if is_valid_identifier(language) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "invalid text search language {language:?}"
        )))
    }
}

/// Double-quotes an identifier that has already been validated.
///
/// Embedded quotes are doubled so the result stays a single identifier even
/// if a caller skips validation.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Renders `"schema"."name"`.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote(schema), quote(name))
}

/// A validated dotted path into the metadata document, e.g. `author.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses and validates a dotted field path.
    pub fn parse(path: &str) -> Result<Self> {
        if !FIELD_PATH.is_match(path) {
            return Err(Error::InvalidFilter(format!("invalid field path {path:?}")));
        }
        Ok(Self {
            segments: path.split('.').map(str::to_string).collect(),
        })
    }

    /// The empty path, addressing the value itself.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Renders the path as a PostgreSQL text-array literal: `'{a,b}'`.
    ///
    /// Segments are restricted to `[A-Za-z0-9_]` so no escaping is required.
    pub fn to_pg_path(&self) -> String {
        format!("'{{{}}}'", self.segments.join(","))
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("docs"));
        assert!(is_valid_identifier("_private_2"));
        assert!(!is_valid_identifier("2docs"));
        assert!(!is_valid_identifier("docs; DROP TABLE x"));
        assert!(!is_valid_identifier("my-index"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_validate_index_name_error() {
        let err = validate_index_name("bad name").unwrap_err();
        assert!(matches!(err, Error::InvalidIndexName(n) if n == "bad name"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("docs"), "\"docs\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified("public", "docs"), "\"public\".\"docs\"");
    }

    #[test]
    fn test_field_path() {
        let path = FieldPath::parse("author.name").unwrap();
        assert_eq!(path.segments(), &["author", "name"]);
        assert_eq!(path.to_pg_path(), "'{author,name}'");
        assert_eq!(path.to_string(), "author.name");

        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("a'}").is_err());
        assert!(FieldPath::parse("$eq").is_err());
    }
}
