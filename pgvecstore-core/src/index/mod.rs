//! Index definitions: ANN configuration, descriptors and the managed table shape.
//!
//! Each index is one table. Its ANN structure is one of:
//!
//! - **Flat** - no secondary index, exact scan
//! - **HNSW** - graph index tuned by `m` (degree) and `ef_construction` (build width)
//! - **IVFFlat** - cluster index tuned by `lists`

pub mod catalog;
pub mod ddl;

pub use catalog::IndexCatalog;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;

/// Column names of a managed table.
pub mod columns {
    pub const ID: &str = "id";
    pub const VECTOR_ID: &str = "vector_id";
    pub const EMBEDDING: &str = "embedding";
    pub const METADATA: &str = "metadata";
    pub const DOCUMENT: &str = "document";
    pub const SEARCH: &str = "document_tsv";
}

/// Largest dimension pgvector can index.
pub const MAX_DIMENSION: u32 = 16_000;

/// pgvector's own defaults, reported when an index carries no reloptions.
const PGVECTOR_DEFAULT_M: u32 = 16;
const PGVECTOR_DEFAULT_EF_CONSTRUCTION: u32 = 64;
const PGVECTOR_DEFAULT_LISTS: u32 = 100;

/// Configuration for an HNSW index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Maximum connections per node. Defaults to 8.
    pub m: Option<u32>,
    /// Candidate list size while building. Defaults to 32.
    pub ef_construction: Option<u32>,
}

impl HnswConfig {
    pub const DEFAULT_M: u32 = 8;
    pub const DEFAULT_EF_CONSTRUCTION: u32 = 32;

    /// Creates a fully specified config.
    pub fn new(m: u32, ef_construction: u32) -> Self {
        Self {
            m: Some(m),
            ef_construction: Some(ef_construction),
        }
    }

    /// Effective `m`.
    pub fn m(&self) -> u32 {
        self.m.unwrap_or(Self::DEFAULT_M)
    }

    /// Effective `ef_construction`.
    pub fn ef_construction(&self) -> u32 {
        self.ef_construction.unwrap_or(Self::DEFAULT_EF_CONSTRUCTION)
    }
}

/// Configuration for an IVFFlat index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IvfFlatConfig {
    /// Number of clusters. Derived from the row count when absent.
    pub lists: Option<u32>,
}

impl IvfFlatConfig {
    pub const MIN_LISTS: u32 = 100;
    pub const MAX_LISTS: u32 = 4000;

    /// Creates a config with an explicit cluster count.
    pub fn new(lists: u32) -> Self {
        Self { lists: Some(lists) }
    }
}

/// ANN structure of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    Flat,
    Hnsw(HnswConfig),
    IvfFlat(IvfFlatConfig),
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig::Hnsw(HnswConfig::default())
    }
}

impl IndexConfig {
    /// The type tag, without parameters.
    pub fn index_type(&self) -> IndexType {
        match self {
            IndexConfig::Flat => IndexType::Flat,
            IndexConfig::Hnsw(_) => IndexType::Hnsw,
            IndexConfig::IvfFlat(_) => IndexType::IvfFlat,
        }
    }

    /// Fills in every unset parameter. `rows` feeds the IVFFlat list count.
    pub fn resolve(&self, rows: u64) -> IndexConfig {
        match self {
            IndexConfig::Flat => IndexConfig::Flat,
            IndexConfig::Hnsw(c) => IndexConfig::Hnsw(HnswConfig::new(c.m(), c.ef_construction())),
            IndexConfig::IvfFlat(c) => {
                IndexConfig::IvfFlat(IvfFlatConfig::new(c.lists.unwrap_or_else(|| default_lists(rows))))
            }
        }
    }

    /// Returns true if building needs the row count.
    pub fn needs_row_count(&self) -> bool {
        matches!(self, IndexConfig::IvfFlat(IvfFlatConfig { lists: None }))
    }

    /// Reconstructs a config from `pg_am.amname` and `pg_class.reloptions`.
    pub fn from_catalog(access_method: &str, reloptions: &[String]) -> Option<IndexConfig> {
        let option = |key: &str| {
            reloptions.iter().find_map(|opt| {
                let (k, v) = opt.split_once('=')?;
                (k.trim() == key).then(|| v.trim().parse::<u32>().ok()).flatten()
            })
        };
        match access_method {
            "hnsw" => Some(IndexConfig::Hnsw(HnswConfig::new(
                option("m").unwrap_or(PGVECTOR_DEFAULT_M),
                option("ef_construction").unwrap_or(PGVECTOR_DEFAULT_EF_CONSTRUCTION),
            ))),
            "ivfflat" => Some(IndexConfig::IvfFlat(IvfFlatConfig::new(
                option("lists").unwrap_or(PGVECTOR_DEFAULT_LISTS),
            ))),
            _ => None,
        }
    }
}

/// Index type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Flat,
    Hnsw,
    IvfFlat,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "flat",
            IndexType::Hnsw => "hnsw",
            IndexType::IvfFlat => "ivfflat",
        }
    }
}

/// IVFFlat cluster count for a table of `rows` rows: `clamp(round(sqrt(rows) * 2), 100, 4000)`.
pub fn default_lists(rows: u64) -> u32 {
    let lists = ((rows as f64).sqrt() * 2.0).round();
    (lists as u32).clamp(IvfFlatConfig::MIN_LISTS, IvfFlatConfig::MAX_LISTS)
}

/// Everything known about one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub dimension: u32,
    pub metric: DistanceMetric,
    pub config: IndexConfig,
    /// Row count at the time of description.
    pub count: u64,
    /// Text-search configuration when full-text search is enabled.
    pub full_text_language: Option<String>,
}

impl IndexDescriptor {
    /// Returns true if keyword and hybrid search are available.
    pub fn full_text_enabled(&self) -> bool {
        self.full_text_language.is_some()
    }

    /// The create key this descriptor corresponds to.
    pub fn key(&self) -> IndexKey {
        IndexKey::new(
            &self.name,
            self.dimension,
            self.metric,
            self.config.index_type(),
            self.full_text_language.as_deref(),
        )
    }
}

/// Fingerprint of the parameters that decide whether `create_index` has work to do.
///
/// Type-specific parameters (`m`, `lists`, ...) are deliberately excluded;
/// changing those goes through `build_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexKey(u32);

impl IndexKey {
    pub fn new(
        name: &str,
        dimension: u32,
        metric: DistanceMetric,
        index_type: IndexType,
        full_text_language: Option<&str>,
    ) -> Self {
        let canonical = format!(
            "{name}:{dimension}:{metric}:{}:{}",
            index_type.as_str(),
            full_text_language.unwrap_or("")
        );
        Self(crc32fast::hash(canonical.as_bytes()))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Columns (name, type) and constraints of an existing table.
///
/// A table is a managed index when it has exactly the columns
/// `id` (int4/int8), `vector_id` (text), `embedding` (vector) and
/// `metadata` (jsonb), optionally both `document` (text) and
/// `document_tsv` (tsvector), and a single-column unique index on
/// `vector_id`. Anything else, including a table that merely has a vector
/// column, is left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableShape {
    pub columns: Vec<(String, String)>,
    pub unique_vector_id: bool,
}

impl TableShape {
    pub fn is_managed(&self) -> bool {
        if !self.unique_vector_id {
            return false;
        }
        let type_of = |name: &str| {
            self.columns
                .iter()
                .find(|(column, _)| column == name)
                .map(|(_, udt)| udt.as_str())
        };

        let required = matches!(type_of(columns::ID), Some("int4" | "int8"))
            && type_of(columns::VECTOR_ID) == Some("text")
            && type_of(columns::EMBEDDING) == Some("vector")
            && type_of(columns::METADATA) == Some("jsonb");
        if !required {
            return false;
        }

        let full_text = match (type_of(columns::DOCUMENT), type_of(columns::SEARCH)) {
            (None, None) => 0,
            (Some("text"), Some("tsvector")) => 2,
            _ => return false,
        };
        self.columns.len() == 4 + full_text
    }

    pub fn has_full_text(&self) -> bool {
        self.columns.iter().any(|(c, _)| c == columns::SEARCH)
    }
}

static REGCONFIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'([A-Za-z_][A-Za-z0-9_]*)'::regconfig").expect("static regex is valid")
});

/// Extracts the text-search language from the generated column expression.
pub fn language_from_generation(expression: &str) -> Option<String> {
    REGCONFIG
        .captures(expression)
        .map(|caps| caps[1].to_string())
}

const METRIC_COMMENT_PREFIX: &str = "metric:";

/// The comment stored on the embedding column.
pub fn metric_comment(metric: DistanceMetric) -> String {
    format!("{METRIC_COMMENT_PREFIX}{metric}")
}

/// Parses a comment written by [`metric_comment`].
pub fn metric_from_comment(comment: &str) -> Option<DistanceMetric> {
    comment
        .strip_prefix(METRIC_COMMENT_PREFIX)
        .and_then(|m| m.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(columns: &[(&str, &str)], unique: bool) -> TableShape {
        TableShape {
            columns: columns
                .iter()
                .map(|(c, t)| (c.to_string(), t.to_string()))
                .collect(),
            unique_vector_id: unique,
        }
    }

    const MANAGED: [(&str, &str); 4] = [
        ("id", "int4"),
        ("vector_id", "text"),
        ("embedding", "vector"),
        ("metadata", "jsonb"),
    ];

    #[test]
    fn test_default_lists() {
        assert_eq!(default_lists(0), 100);
        assert_eq!(default_lists(10_000), 200);
        assert_eq!(default_lists(1_000_000), 2000);
        assert_eq!(default_lists(100_000_000), 4000);
    }

    #[test]
    fn test_resolve_fills_defaults() {
        assert_eq!(
            IndexConfig::Hnsw(HnswConfig::default()).resolve(0),
            IndexConfig::Hnsw(HnswConfig::new(8, 32))
        );
        assert_eq!(
            IndexConfig::IvfFlat(IvfFlatConfig::default()).resolve(40_000),
            IndexConfig::IvfFlat(IvfFlatConfig::new(400))
        );
        assert_eq!(
            IndexConfig::IvfFlat(IvfFlatConfig::new(50)).resolve(40_000),
            IndexConfig::IvfFlat(IvfFlatConfig::new(50))
        );
    }

    #[test]
    fn test_config_serde_tagged() {
        let config: IndexConfig =
            serde_json::from_str(r#"{"type":"hnsw","m":16,"ef_construction":64}"#).unwrap();
        assert_eq!(config, IndexConfig::Hnsw(HnswConfig::new(16, 64)));

        let config: IndexConfig = serde_json::from_str(r#"{"type":"ivfflat"}"#).unwrap();
        assert_eq!(config, IndexConfig::IvfFlat(IvfFlatConfig::default()));

        let config: IndexConfig = serde_json::from_str(r#"{"type":"flat"}"#).unwrap();
        assert_eq!(config, IndexConfig::Flat);
    }

    #[test]
    fn test_from_catalog() {
        let opts = vec!["m=12".to_string(), "ef_construction=40".to_string()];
        assert_eq!(
            IndexConfig::from_catalog("hnsw", &opts),
            Some(IndexConfig::Hnsw(HnswConfig::new(12, 40)))
        );
        assert_eq!(
            IndexConfig::from_catalog("ivfflat", &[]),
            Some(IndexConfig::IvfFlat(IvfFlatConfig::new(100)))
        );
        assert_eq!(IndexConfig::from_catalog("btree", &[]), None);
    }

    #[test]
    fn test_key_ignores_type_parameters() {
        let a = IndexKey::new("docs", 3, DistanceMetric::Cosine, IndexType::Hnsw, None);
        let b = IndexKey::new("docs", 3, DistanceMetric::Cosine, IndexType::Hnsw, None);
        assert_eq!(a, b);
        assert_ne!(
            a,
            IndexKey::new("docs", 3, DistanceMetric::Cosine, IndexType::IvfFlat, None)
        );
        assert_ne!(
            a,
            IndexKey::new("docs", 3, DistanceMetric::Euclidean, IndexType::Hnsw, None)
        );
        assert_ne!(
            a,
            IndexKey::new("docs", 4, DistanceMetric::Cosine, IndexType::Hnsw, None)
        );
    }

    #[test]
    fn test_managed_shape() {
        assert!(shape(&MANAGED, true).is_managed());

        let mut with_text = MANAGED.to_vec();
        with_text.push(("document", "text"));
        with_text.push(("document_tsv", "tsvector"));
        let s = shape(&with_text, true);
        assert!(s.is_managed());
        assert!(s.has_full_text());
    }

    #[test]
    fn test_unmanaged_shapes() {
        // missing unique constraint
        assert!(!shape(&MANAGED, false).is_managed());
        // a foreign table that only has a vector column
        assert!(!shape(&[("id", "int4"), ("embedding", "vector")], true).is_managed());
        // extra columns
        let mut extra = MANAGED.to_vec();
        extra.push(("owner", "text"));
        assert!(!shape(&extra, true).is_managed());
        // half of the full-text pair
        let mut half = MANAGED.to_vec();
        half.push(("document", "text"));
        assert!(!shape(&half, true).is_managed());
        // wrong id type
        let mut wrong = MANAGED.to_vec();
        wrong[1] = ("vector_id", "uuid");
        assert!(!shape(&wrong, true).is_managed());
    }

    #[test]
    fn test_language_from_generation() {
        let expr = "to_tsvector('english'::regconfig, COALESCE(document, ''::text))";
        assert_eq!(language_from_generation(expr), Some("english".into()));
        assert_eq!(language_from_generation("lower(x)"), None);
    }

    #[test]
    fn test_metric_comment() {
        let comment = metric_comment(DistanceMetric::DotProduct);
        assert_eq!(comment, "metric:dotproduct");
        assert_eq!(metric_from_comment(&comment), Some(DistanceMetric::DotProduct));
        assert_eq!(metric_from_comment("something else"), None);
    }
}
