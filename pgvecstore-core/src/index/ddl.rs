//! DDL for managed tables and their ANN structures.
//!
//! Identifiers are validated before they reach these functions; numeric
//! parameters come from typed configs. Storage parameters cannot be bound, so
//! they are rendered as integers.

use super::{columns, metric_comment, IndexConfig};
use crate::distance::DistanceMetric;
use crate::extension::VectorTypeRef;
use crate::ident::{qualified, quote, MAX_IDENTIFIER_LEN};

const ANN_SUFFIX: &str = "_vector_idx";
const SEARCH_SUFFIX: &str = "_document_tsv_idx";

/// Name of the ANN index on `index`'s table.
pub fn ann_index_name(index: &str) -> String {
    derived_name(index, ANN_SUFFIX)
}

/// Name of the GIN index over the search column.
pub fn search_index_name(index: &str) -> String {
    derived_name(index, SEARCH_SUFFIX)
}

/// `{index}{suffix}`, or a shortened prefix plus a crc32 of `index` when that
/// would exceed the identifier limit. Index names are ASCII.
fn derived_name(index: &str, suffix: &str) -> String {
    if index.len() + suffix.len() <= MAX_IDENTIFIER_LEN {
        return format!("{index}{suffix}");
    }
    let checksum = crc32fast::hash(index.as_bytes());
    let keep = MAX_IDENTIFIER_LEN - suffix.len() - 9;
    format!("{}_{checksum:08x}{suffix}", &index[..keep.min(index.len())])
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote(schema))
}

pub fn create_table(schema: &str, index: &str, dimension: u32, vector_type: &VectorTypeRef) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         {id} SERIAL PRIMARY KEY, \
         {vector_id} TEXT NOT NULL UNIQUE, \
         {embedding} {column_type} NOT NULL, \
         {metadata} JSONB NOT NULL DEFAULT '{{}}'::jsonb)",
        table = qualified(schema, index),
        id = columns::ID,
        vector_id = columns::VECTOR_ID,
        embedding = columns::EMBEDDING,
        column_type = vector_type.column_type(dimension),
        metadata = columns::METADATA,
    )
}

/// Adds the raw text and generated `tsvector` columns.
pub fn add_full_text_columns(schema: &str, index: &str, language: &str) -> Vec<String> {
    let table = qualified(schema, index);
    vec![
        format!(
            "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {} TEXT",
            columns::DOCUMENT
        ),
        format!(
            "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {search} tsvector \
             GENERATED ALWAYS AS (to_tsvector('{language}'::regconfig, coalesce({document}, ''))) STORED",
            search = columns::SEARCH,
            document = columns::DOCUMENT,
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} USING gin ({})",
            quote(&search_index_name(index)),
            columns::SEARCH
        ),
    ]
}

pub fn comment_metric(schema: &str, index: &str, metric: DistanceMetric) -> String {
    format!(
        "COMMENT ON COLUMN {}.{} IS '{}'",
        qualified(schema, index),
        columns::EMBEDDING,
        metric_comment(metric)
    )
}

pub fn drop_ann_index(schema: &str, index: &str) -> String {
    format!(
        "DROP INDEX IF EXISTS {}",
        qualified(schema, &ann_index_name(index))
    )
}

/// `CREATE INDEX` for a resolved config; `None` for flat.
pub fn create_ann_index(
    schema: &str,
    index: &str,
    metric: DistanceMetric,
    config: &IndexConfig,
    vector_type: &VectorTypeRef,
) -> Option<String> {
    let (method, options) = match config {
        IndexConfig::Flat => return None,
        IndexConfig::Hnsw(c) => (
            "hnsw",
            format!("m = {}, ef_construction = {}", c.m(), c.ef_construction()),
        ),
        IndexConfig::IvfFlat(c) => (
            "ivfflat",
            format!("lists = {}", c.lists.unwrap_or(super::IvfFlatConfig::MIN_LISTS)),
        ),
    };
    Some(format!(
        "CREATE INDEX {} ON {} USING {method} ({} {}) WITH ({options})",
        quote(&ann_index_name(index)),
        qualified(schema, index),
        columns::EMBEDDING,
        vector_type.ops_class(metric),
    ))
}

pub fn drop_table(schema: &str, index: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", qualified(schema, index))
}

pub fn truncate_table(schema: &str, index: &str) -> String {
    format!("TRUNCATE TABLE {}", qualified(schema, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{HnswConfig, IvfFlatConfig};

    #[test]
    fn test_create_table() {
        let sql = create_table("public", "docs", 3, &VectorTypeRef::unqualified());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"docs\" ("));
        assert!(sql.contains("vector_id TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("embedding vector(3) NOT NULL"));
        assert!(sql.contains("metadata JSONB NOT NULL DEFAULT '{}'::jsonb"));
    }

    #[test]
    fn test_create_table_qualifies_type() {
        let vt = VectorTypeRef::for_schemas(Some("extensions"), "app");
        let sql = create_table("app", "docs", 768, &vt);
        assert!(sql.contains("embedding \"extensions\".vector(768)"));
    }

    #[test]
    fn test_ann_index() {
        let vt = VectorTypeRef::unqualified();
        let hnsw = create_ann_index(
            "public",
            "docs",
            DistanceMetric::Cosine,
            &IndexConfig::Hnsw(HnswConfig::new(16, 64)),
            &vt,
        )
        .unwrap();
        assert_eq!(
            hnsw,
            "CREATE INDEX \"docs_vector_idx\" ON \"public\".\"docs\" USING hnsw (embedding vector_cosine_ops) WITH (m = 16, ef_construction = 64)"
        );

        let ivf = create_ann_index(
            "public",
            "docs",
            DistanceMetric::Euclidean,
            &IndexConfig::IvfFlat(IvfFlatConfig::new(250)),
            &vt,
        )
        .unwrap();
        assert!(ivf.ends_with("USING ivfflat (embedding vector_l2_ops) WITH (lists = 250)"));

        assert!(create_ann_index("public", "docs", DistanceMetric::Cosine, &IndexConfig::Flat, &vt)
            .is_none());
    }

    #[test]
    fn test_full_text_columns() {
        let stmts = add_full_text_columns("public", "docs", "english");
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].contains("to_tsvector('english'::regconfig, coalesce(document, ''))"));
        assert!(stmts[2].contains("USING gin (document_tsv)"));
    }

    #[test]
    fn test_derived_names_fit_identifier_limit() {
        for len in 1..=MAX_IDENTIFIER_LEN {
            let index = "a".repeat(len);
            for name in [ann_index_name(&index), search_index_name(&index)] {
                assert!(name.len() <= MAX_IDENTIFIER_LEN, "{name} is {} bytes", name.len());
                assert_ne!(name, index);
            }
        }

        let long_a = format!("{}x", "a".repeat(62));
        let long_b = format!("{}y", "a".repeat(62));
        assert_ne!(ann_index_name(&long_a), ann_index_name(&long_b));
        assert!(ann_index_name(&long_a).ends_with("_vector_idx"));
        assert!(search_index_name(&long_a).ends_with("_document_tsv_idx"));
        assert_eq!(ann_index_name("docs"), "docs_vector_idx");
    }

    #[test]
    fn test_drop_and_comment() {
        assert_eq!(
            drop_ann_index("public", "docs"),
            "DROP INDEX IF EXISTS \"public\".\"docs_vector_idx\""
        );
        assert_eq!(
            comment_metric("public", "docs", DistanceMetric::Euclidean),
            "COMMENT ON COLUMN \"public\".\"docs\".embedding IS 'metric:euclidean'"
        );
    }
}
