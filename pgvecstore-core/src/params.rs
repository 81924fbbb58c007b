//! Ordered bind parameters for generated statements.

use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;
use sqlx::Arguments;

use crate::error::{Error, Result};

/// A bind value for parameterized SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Float(f64),
    Int(i64),
    /// Bound as `jsonb`.
    Json(Value),
}

/// Bind values in placeholder order. `push` returns the `$n` to embed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<SqlParam>,
}

impl Params {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value and returns its placeholder.
    pub fn push(&mut self, value: SqlParam) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    /// Appends a text value.
    pub fn text<S: Into<String>>(&mut self, value: S) -> String {
        self.push(SqlParam::Text(value.into()))
    }

    /// Appends a JSON value.
    pub fn json(&mut self, value: Value) -> String {
        self.push(SqlParam::Json(value))
    }

    /// Number of values pushed so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values in placeholder order.
    pub fn values(&self) -> &[SqlParam] {
        &self.values
    }

    /// Encodes the values for `sqlx::query_with`.
    pub fn into_arguments(self) -> Result<PgArguments> {
        let mut args = PgArguments::default();
        for value in self.values {
            let added = match value {
                SqlParam::Text(s) => args.add(s),
                SqlParam::Float(f) => args.add(f),
                SqlParam::Int(i) => args.add(i),
                SqlParam::Json(v) => args.add(Json(v)),
            };
            added.map_err(|e| Error::Database(sqlx::Error::Encode(e)))?;
        }
        Ok(args)
    }
}
