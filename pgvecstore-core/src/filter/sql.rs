//! Compiles [`Filter`] trees to PostgreSQL predicates over a JSONB document.
//!
//! Every fragment produced here evaluates to `TRUE` or `FALSE`, never `NULL`,
//! so negation (`$ne`, `$nin`, `$not`, `$nor`) keeps set-complement
//! semantics for rows where the field is missing. Values are pushed to
//! [`Params`]; only validated field paths and fixed SQL text are embedded.

use serde_json::Value;

use super::{Condition, ElemMatch, Filter, RegexOptions};
use crate::error::Result;
use crate::ident::FieldPath;
use crate::params::{Params, SqlParam};

/// Text that PostgreSQL can cast to `numeric` without error.
pub(crate) const NUMERIC_PATTERN: &str = r"^\s*-?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][-+]?[0-9]+)?\s*$";

/// Column holding the metadata document.
pub const METADATA_COLUMN: &str = "metadata";

/// Translates `filter` against the `metadata` column.
///
/// # Example
///
/// ```
/// use pgvecstore_core::{Filter, Params};
/// use pgvecstore_core::filter::translate;
///
/// let mut params = Params::new();
/// let clause = translate(&Filter::field("page").gte(3), &mut params).unwrap();
/// assert!(clause.contains("$1"));
/// assert_eq!(params.len(), 1);
/// ```
pub fn translate(filter: &Filter, params: &mut Params) -> Result<String> {
    translate_at(filter, METADATA_COLUMN, params)
}

/// Translates `filter` against an arbitrary JSONB expression.
pub fn translate_at(filter: &Filter, root: &str, params: &mut Params) -> Result<String> {
    Translator { params, depth: 0 }.filter(filter, root)
}

struct Translator<'a> {
    params: &'a mut Params,
    /// Nesting level of `$elemMatch`, used to keep aliases distinct.
    depth: usize,
}

/// The two views of one field: `#>` (jsonb) and `#>>` (text).
struct Target {
    json: String,
    text: String,
}

impl Target {
    fn new(root: &str, path: &FieldPath) -> Self {
        if path.segments().is_empty() {
            Self {
                json: root.to_string(),
                text: format!("({root} #>> '{{}}')"),
            }
        } else {
            let pg_path = path.to_pg_path();
            Self {
                json: format!("({root} #> {pg_path})"),
                text: format!("({root} #>> {pg_path})"),
            }
        }
    }
}

impl Translator<'_> {
    fn filter(&mut self, filter: &Filter, root: &str) -> Result<String> {
        match filter {
            Filter::And(children) => self.join(children, root, " AND ", "TRUE"),
            Filter::Or(children) => self.join(children, root, " OR ", "FALSE"),
            Filter::Nor(children) => {
                if children.is_empty() {
                    Ok("TRUE".into())
                } else {
                    Ok(format!("(NOT {})", self.join(children, root, " OR ", "FALSE")?))
                }
            }
            Filter::Not(inner) => Ok(format!("(NOT {})", self.filter(inner, root)?)),
            Filter::Field(path, conditions) => {
                let target = Target::new(root, path);
                self.conditions(conditions, &target)
            }
        }
    }

    fn join(&mut self, children: &[Filter], root: &str, sep: &str, empty: &str) -> Result<String> {
        match children {
            [] => Ok(empty.to_string()),
            [only] => self.filter(only, root),
            _ => {
                let parts = children
                    .iter()
                    .map(|c| self.filter(c, root))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(sep)))
            }
        }
    }

    fn conditions(&mut self, conditions: &[Condition], target: &Target) -> Result<String> {
        let parts = conditions
            .iter()
            .map(|c| self.condition(c, target))
            .collect::<Result<Vec<_>>>()?;
        Ok(match parts.len() {
            0 => "TRUE".to_string(),
            1 => parts.into_iter().next().unwrap_or_default(),
            _ => format!("({})", parts.join(" AND ")),
        })
    }

    fn condition(&mut self, condition: &Condition, t: &Target) -> Result<String> {
        let fragment = match condition {
            Condition::Eq(value) => self.eq(value, t),
            Condition::Ne(value) => match value {
                Value::Null => format!("({} IS NOT NULL)", t.text),
                _ => format!("(NOT {})", self.eq(value, t)),
            },
            Condition::Gt(value) => self.compare(">", value, t),
            Condition::Gte(value) => self.compare(">=", value, t),
            Condition::Lt(value) => self.compare("<", value, t),
            Condition::Lte(value) => self.compare("<=", value, t),
            Condition::In(values) => self.membership(values, t),
            Condition::Nin(values) => {
                if values.is_empty() {
                    "TRUE".to_string()
                } else {
                    format!("(NOT {})", self.membership(values, t))
                }
            }
            Condition::All(values) => {
                if values.is_empty() {
                    "FALSE".to_string()
                } else {
                    let p = self.params.json(Value::Array(values.clone()));
                    format!(
                        "COALESCE(jsonb_typeof({j}) = 'array' AND {j} @> {p}, FALSE)",
                        j = t.json
                    )
                }
            }
            Condition::Contains(value) => self.contains(value, t),
            Condition::Exists(true) => format!("({} IS NOT NULL)", t.json),
            Condition::Exists(false) => format!("({} IS NULL)", t.json),
            Condition::Regex { pattern, options } => {
                let p = self.params.text(regex_with_flags(pattern, *options));
                format!(
                    "COALESCE(jsonb_typeof({}) = 'string' AND {} ~ {p}, FALSE)",
                    t.json, t.text
                )
            }
            Condition::Size(len) => {
                let p = self.params.push(SqlParam::Int(*len as i64));
                format!(
                    "COALESCE(CASE WHEN jsonb_typeof({j}) = 'array' THEN jsonb_array_length({j}) = {p} ELSE FALSE END, FALSE)",
                    j = t.json
                )
            }
            Condition::ElemMatch(inner) => self.elem_match(inner, t)?,
            Condition::Not(inner) => format!("(NOT {})", self.conditions(inner, t)?),
        };
        Ok(fragment)
    }

    fn eq(&mut self, value: &Value, t: &Target) -> String {
        match value {
            Value::Null => format!("({} IS NULL)", t.text),
            Value::Array(_) | Value::Object(_) => {
                let p = self.params.json(value.clone());
                format!("COALESCE({} = {p}, FALSE)", t.json)
            }
            _ => {
                let p = self.params.json(value.clone());
                format!(
                    "COALESCE({j} = {p} OR (jsonb_typeof({j}) = 'array' AND {j} @> jsonb_build_array({p})), FALSE)",
                    j = t.json
                )
            }
        }
    }

    fn compare(&mut self, op: &str, value: &Value, t: &Target) -> String {
        let numeric = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if is_numeric_string(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match (numeric, value) {
            (Some(n), _) => {
                let p = self.params.push(SqlParam::Float(n));
                format!(
                    "COALESCE((CASE WHEN {txt} ~ '{NUMERIC_PATTERN}' THEN ({txt})::numeric END) {op} {p}::numeric, FALSE)",
                    txt = t.text
                )
            }
            (None, Value::String(s)) => {
                let p = self.params.text(s.clone());
                format!(
                    "COALESCE(jsonb_typeof({}) = 'string' AND {} {op} {p}, FALSE)",
                    t.json, t.text
                )
            }
            // Parsing rejects every other operand type.
            (None, _) => "FALSE".to_string(),
        }
    }

    /// Scalar membership or array overlap. Empty lists match nothing.
    fn membership(&mut self, values: &[Value], t: &Target) -> String {
        if values.is_empty() {
            return "FALSE".to_string();
        }
        let p = self.params.json(Value::Array(values.to_vec()));
        format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements({p}) AS candidate(value) \
             WHERE {j} = candidate.value \
             OR (candidate.value = 'null'::jsonb AND {j} IS NULL) \
             OR (jsonb_typeof({j}) = 'array' AND {j} @> jsonb_build_array(candidate.value)))",
            j = t.json
        )
    }

    fn contains(&mut self, value: &Value, t: &Target) -> String {
        let p = self.params.json(value.clone());
        let j = &t.json;
        let body = match value {
            Value::String(_) => format!(
                "CASE jsonb_typeof({j}) WHEN 'array' THEN {j} @> jsonb_build_array({p}) \
                 WHEN 'string' THEN strpos({}, {p} #>> '{{}}') > 0 ELSE FALSE END",
                t.text
            ),
            Value::Object(_) => format!(
                "CASE jsonb_typeof({j}) WHEN 'array' THEN {j} @> jsonb_build_array({p}) \
                 WHEN 'object' THEN {j} @> {p} ELSE FALSE END"
            ),
            Value::Array(_) => {
                format!("CASE jsonb_typeof({j}) WHEN 'array' THEN {j} @> {p} ELSE FALSE END")
            }
            _ => format!(
                "CASE jsonb_typeof({j}) WHEN 'array' THEN {j} @> jsonb_build_array({p}) \
                 ELSE {j} = {p} END"
            ),
        };
        format!("COALESCE({body}, FALSE)")
    }

    fn elem_match(&mut self, inner: &ElemMatch, t: &Target) -> Result<String> {
        self.depth += 1;
        let alias = format!("elem{}", self.depth);
        let element = format!("{alias}.value");
        let predicate = match inner {
            ElemMatch::Conditions(conditions) => {
                let target = Target::new(&element, &FieldPath::root());
                self.conditions(conditions, &target)
            }
            ElemMatch::Document(filter) => self.filter(filter, &element),
        };
        self.depth -= 1;
        Ok(format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof({j}) = 'array' THEN {j} ELSE '[]'::jsonb END) AS {alias}(value) WHERE {})",
            predicate?,
            j = t.json
        ))
    }
}

/// Prefixes a pattern with PostgreSQL's embedded ARE options.
///
/// PostgreSQL's default lets `.` match newlines and anchors match only at the
/// ends of the string; the flags below restore the requested behaviour.
fn regex_with_flags(pattern: &str, options: RegexOptions) -> String {
    let mut flags = String::new();
    if options.case_insensitive {
        flags.push('i');
    }
    flags.push(match (options.multiline, options.dot_all) {
        (false, false) => 'p',
        (true, false) => 'n',
        (false, true) => 's',
        (true, true) => 'w',
    });
    format!("(?{flags}){pattern}")
}

fn is_numeric_string(s: &str) -> bool {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static NUMERIC: Lazy<Regex> =
        Lazy::new(|| Regex::new(NUMERIC_PATTERN).expect("static regex is valid"));
    NUMERIC.is_match(s)
}
