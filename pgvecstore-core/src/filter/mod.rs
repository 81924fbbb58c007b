//! Filter expressions for metadata-based vector filtering.
//!
//! Filters restrict search and delete operations by conditions on the JSONB
//! metadata column, e.g. "source_id = 'doc1.pdf' AND page >= 3". They can be
//! parsed from the MongoDB-style JSON form:
//!
//! ```json
//! { "$and": [ { "source_id": "doc1.pdf" }, { "page": { "$gte": 3 } } ] }
//! ```
//!
//! or built fluently with [`Filter::field`]. Either way the result is a typed
//! tree that [`sql::translate`] compiles to a parameterized predicate.

pub mod sql;

pub use sql::translate;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::ident::FieldPath;

/// A filter expression over the metadata document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All children match. Empty matches everything.
    And(Vec<Filter>),
    /// Any child matches. Empty matches nothing.
    Or(Vec<Filter>),
    /// No child matches. Empty matches everything.
    Nor(Vec<Filter>),
    /// The child does not match.
    Not(Box<Filter>),
    /// Every condition holds for the field at the path.
    Field(FieldPath, Vec<Condition>),
}

/// A single operator applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    ElemMatch(ElemMatch),
    Contains(Value),
    Exists(bool),
    Regex {
        pattern: String,
        options: RegexOptions,
    },
    Size(u64),
    /// Negation of an operator map.
    Not(Vec<Condition>),
}

/// The nested condition of an `$elemMatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum ElemMatch {
    /// Operator map applied to each scalar element: `{"$gt": 5}`.
    Conditions(Vec<Condition>),
    /// Filter applied to each object element: `{"name": "x"}`.
    Document(Box<Filter>),
}

/// Flags accepted by `$options`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexOptions {
    /// `i`
    pub case_insensitive: bool,
    /// `m`: `^` and `$` match at line breaks.
    pub multiline: bool,
    /// `s`: `.` matches a newline.
    pub dot_all: bool,
}

impl RegexOptions {
    /// Parses an `$options` string such as `"im"`.
    pub fn parse(flags: &str) -> Result<Self> {
        let mut options = Self::default();
        for flag in flags.chars() {
            match flag {
                'i' => options.case_insensitive = true,
                'm' => options.multiline = true,
                's' => options.dot_all = true,
                other => {
                    return Err(Error::InvalidFilter(format!(
                        "unsupported regex option {other:?}"
                    )))
                }
            }
        }
        Ok(options)
    }
}

const LOGICAL_OPERATORS: [&str; 3] = ["$and", "$or", "$nor"];

impl Filter {
    /// Creates a filter for a specific field.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid field path. Use [`Filter::try_field`]
    /// for untrusted input.
    ///
    /// # Example
    ///
    /// ```
    /// use pgvecstore_core::Filter;
    ///
    /// let filter = Filter::field("category").eq("documents");
    /// ```
    pub fn field(name: &str) -> FieldFilter {
        match Self::try_field(name) {
            Ok(field) => field,
            Err(e) => panic!("{e}"),
        }
    }

    /// Creates a filter for a field path, validating it.
    pub fn try_field(name: &str) -> Result<FieldFilter> {
        Ok(FieldFilter {
            path: FieldPath::parse(name)?,
        })
    }

    /// The filter that matches every row.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    /// Parses the JSON filter form.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(map) => parse_filter(map),
            other => Err(Error::InvalidFilter(format!(
                "filter must be an object, got {other}"
            ))),
        }
    }

    /// Combines this filter with another using AND.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Combines this filter with another using OR.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut children) => {
                children.push(other);
                Filter::Or(children)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Negates this filter.
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Returns true if the filter places no restriction at all.
    ///
    /// Only structurally empty conjunctions count; `{"$or": []}` restricts
    /// everything and is not empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::And(children) => children.iter().all(Filter::is_empty),
            Filter::Nor(children) => children.is_empty(),
            _ => false,
        }
    }
}

impl TryFrom<Value> for Filter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Filter::from_json(&value)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Filter::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Builder for field-specific filter conditions.
#[derive(Debug)]
pub struct FieldFilter {
    path: FieldPath,
}

impl FieldFilter {
    fn with(self, condition: Condition) -> Filter {
        Filter::Field(self.path, vec![condition])
    }

    /// Field equals value (or, for array fields, contains it).
    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Eq(value.into()))
    }

    /// Field not equals value.
    pub fn ne<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Ne(value.into()))
    }

    /// Field greater than value.
    pub fn gt<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Gt(value.into()))
    }

    /// Field greater than or equal to value.
    pub fn gte<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Gte(value.into()))
    }

    /// Field less than value.
    pub fn lt<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Lt(value.into()))
    }

    /// Field less than or equal to value.
    pub fn lte<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Lte(value.into()))
    }

    /// Field value is in the given list.
    pub fn contained_in<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        self.with(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// Field value is not in the given list.
    pub fn not_in<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        self.with(Condition::Nin(values.into_iter().map(Into::into).collect()))
    }

    /// Array field contains every listed value.
    pub fn all<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        self.with(Condition::All(values.into_iter().map(Into::into).collect()))
    }

    /// Array contains the element, or string contains the substring.
    pub fn contains<V: Into<Value>>(self, value: V) -> Filter {
        self.with(Condition::Contains(value.into()))
    }

    /// Field exists.
    pub fn exists(self) -> Filter {
        self.with(Condition::Exists(true))
    }

    /// Field is absent.
    pub fn missing(self) -> Filter {
        self.with(Condition::Exists(false))
    }

    /// Field matches a regular expression.
    pub fn regex(self, pattern: &str, options: RegexOptions) -> Filter {
        self.with(Condition::Regex {
            pattern: pattern.to_string(),
            options,
        })
    }

    /// Array field has exactly `len` elements.
    pub fn size(self, len: u64) -> Filter {
        self.with(Condition::Size(len))
    }

    /// Some element of the array field matches `filter`.
    pub fn elem_match(self, filter: Filter) -> Filter {
        self.with(Condition::ElemMatch(ElemMatch::Document(Box::new(filter))))
    }
}

fn parse_filter(map: &Map<String, Value>) -> Result<Filter> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Filter::And(parse_filter_list(key, value)?),
            "$or" => Filter::Or(parse_filter_list(key, value)?),
            "$nor" => Filter::Nor(parse_filter_list(key, value)?),
            "$not" => match value {
                Value::Object(inner) if inner.is_empty() => return Err(Error::EmptyNot),
                Value::Object(inner) => Filter::Not(Box::new(parse_filter(inner)?)),
                _ => {
                    return Err(Error::InvalidFilter(
                        "$not at the top level expects a filter object".into(),
                    ))
                }
            },
            op if op.starts_with('$') => return Err(Error::UnsupportedOperator(op.to_string())),
            field => Filter::Field(FieldPath::parse(field)?, parse_field_value(value)?),
        };
        clauses.push(clause);
    }

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(Filter::And(clauses))
    }
}

fn parse_filter_list(op: &str, value: &Value) -> Result<Vec<Filter>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::InvalidFilter(format!("{op} expects an array of filters")))?;
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => parse_filter(map),
            other => Err(Error::InvalidFilter(format!(
                "{op} element must be an object, got {other}"
            ))),
        })
        .collect()
}

/// Parses the value attached to a field: an operator map or an implicit `$eq`.
fn parse_field_value(value: &Value) -> Result<Vec<Condition>> {
    match value {
        Value::Object(map) if !map.is_empty() => {
            let operators = map.keys().filter(|k| k.starts_with('$')).count();
            if operators == map.len() {
                parse_conditions(map)
            } else if operators == 0 {
                Ok(vec![Condition::Eq(value.clone())])
            } else {
                Err(Error::InvalidFilter(
                    "cannot mix operators and plain fields in one object".into(),
                ))
            }
        }
        other => Ok(vec![Condition::Eq(other.clone())]),
    }
}

fn parse_conditions(map: &Map<String, Value>) -> Result<Vec<Condition>> {
    let mut conditions = Vec::with_capacity(map.len());
    let options = match map.get("$options") {
        Some(Value::String(flags)) => {
            if !map.contains_key("$regex") {
                return Err(Error::InvalidFilter("$options requires $regex".into()));
            }
            RegexOptions::parse(flags)?
        }
        Some(other) => {
            return Err(Error::InvalidFilter(format!(
                "$options must be a string, got {other}"
            )))
        }
        None => RegexOptions::default(),
    };

    for (op, value) in map {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(value.clone()),
            "$ne" => Condition::Ne(value.clone()),
            "$gt" => Condition::Gt(comparable(op, value)?),
            "$gte" => Condition::Gte(comparable(op, value)?),
            "$lt" => Condition::Lt(comparable(op, value)?),
            "$lte" => Condition::Lte(comparable(op, value)?),
            "$in" => Condition::In(array(op, value)?),
            "$nin" => Condition::Nin(array(op, value)?),
            "$all" => Condition::All(array(op, value)?),
            "$contains" => Condition::Contains(value.clone()),
            "$exists" => Condition::Exists(value.as_bool().ok_or_else(|| {
                Error::InvalidFilter(format!("$exists expects a boolean, got {value}"))
            })?),
            "$regex" => Condition::Regex {
                pattern: value
                    .as_str()
                    .ok_or_else(|| {
                        Error::InvalidFilter(format!("$regex expects a string, got {value}"))
                    })?
                    .to_string(),
                options,
            },
            "$options" => continue,
            "$size" => Condition::Size(value.as_u64().ok_or_else(|| {
                Error::InvalidFilter(format!("$size expects a non-negative integer, got {value}"))
            })?),
            "$elemMatch" => Condition::ElemMatch(parse_elem_match(value)?),
            "$not" => match value {
                Value::Object(inner) if inner.is_empty() => return Err(Error::EmptyNot),
                Value::Object(inner) => Condition::Not(parse_conditions(inner)?),
                other => {
                    return Err(Error::InvalidFilter(format!(
                        "$not expects an operator object, got {other}"
                    )))
                }
            },
            op if op.starts_with('$') => return Err(Error::UnsupportedOperator(op.to_string())),
            field => {
                return Err(Error::InvalidFilter(format!(
                    "unexpected field {field:?} inside an operator map"
                )))
            }
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn parse_elem_match(value: &Value) -> Result<ElemMatch> {
    let map = match value {
        Value::Object(map) if !map.is_empty() => map,
        other => {
            return Err(Error::InvalidFilter(format!(
                "$elemMatch expects a non-empty object, got {other}"
            )))
        }
    };

    let is_document = map
        .keys()
        .any(|k| !k.starts_with('$') || LOGICAL_OPERATORS.contains(&k.as_str()));
    if is_document {
        Ok(ElemMatch::Document(Box::new(parse_filter(map)?)))
    } else {
        Ok(ElemMatch::Conditions(parse_conditions(map)?))
    }
}

fn comparable(op: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(_) | Value::String(_) => Ok(value.clone()),
        other => Err(Error::InvalidFilter(format!(
            "{op} expects a number or string, got {other}"
        ))),
    }
}

fn array(op: &str, value: &Value) -> Result<Vec<Value>> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| Error::InvalidFilter(format!("{op} expects an array, got {value}")))
}
