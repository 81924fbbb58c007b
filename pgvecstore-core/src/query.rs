//! Search statements for the three search modes.
//!
//! - **Vector**: `score = 1 - distance` under the index metric, ordered by distance
//! - **Text**: `ts_rank_cd` over the generated `tsvector` column
//! - **Hybrid**: both scores normalized over a candidate pool and fused as
//!   `semantic_weight * vector + keyword_weight * text`
//!
//! ANN tuning (`hnsw.ef_search`, `ivfflat.probes`) is transaction-local and is
//! described by [`SearchTuning`]; the store applies it inside the same
//! transaction as the statement.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::error::{Error, Result};
use crate::extension::VectorTypeRef;
use crate::filter::{translate, Filter};
use crate::ident::qualified;
use crate::index::{columns, IndexConfig, IndexDescriptor};
use crate::params::{Params, SqlParam};
use crate::payload::Payload;
use crate::vector::{Vector, VectorId};

/// Upper bound pgvector accepts for `hnsw.ef_search`.
pub const MAX_EF_SEARCH: u32 = 1000;

/// Which score drives the ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Vector,
    Text,
    Hybrid,
}

/// Weights for hybrid fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub semantic_weight: f64,
    pub keyword_weight: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.5,
            keyword_weight: 0.5,
        }
    }
}

impl HybridConfig {
    pub fn new(semantic_weight: f64, keyword_weight: f64) -> Self {
        Self {
            semantic_weight,
            keyword_weight,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = |w: f64| w.is_finite() && w >= 0.0;
        if !valid(self.semantic_weight) || !valid(self.keyword_weight) {
            return Err(Error::InvalidArgument(
                "hybrid weights must be finite and non-negative".into(),
            ));
        }
        if self.semantic_weight + self.keyword_weight == 0.0 {
            return Err(Error::InvalidArgument(
                "at least one hybrid weight must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters of a search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Query embedding. Required for vector and hybrid search.
    #[serde(alias = "query_vector")]
    pub vector: Option<Vector>,
    pub top_k: u32,
    pub filter: Option<Filter>,
    pub include_vector: bool,
    pub min_score: f64,
    /// HNSW search breadth; derived from `top_k` and `m` when absent.
    pub ef: Option<u32>,
    /// IVFFlat probe count; the server default applies when absent.
    pub probes: Option<u32>,
    pub search_mode: SearchMode,
    /// Query text. Required for text and hybrid search.
    pub query_text: Option<String>,
    pub hybrid_config: Option<HybridConfig>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            vector: None,
            top_k: 10,
            filter: None,
            include_vector: false,
            min_score: 0.0,
            ef: None,
            probes: None,
            search_mode: SearchMode::Vector,
            query_text: None,
            hybrid_config: None,
        }
    }
}

impl QueryParams {
    /// Nearest-neighbour search for `vector`.
    pub fn new<V: Into<Vector>>(vector: V) -> Self {
        Self {
            vector: Some(vector.into()),
            ..Default::default()
        }
    }

    /// Keyword search for `text`.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            search_mode: SearchMode::Text,
            query_text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Hybrid search for `vector` and `text`.
    pub fn hybrid<V: Into<Vector>, S: Into<String>>(vector: V, text: S, weights: HybridConfig) -> Self {
        Self {
            vector: Some(vector.into()),
            search_mode: SearchMode::Hybrid,
            query_text: Some(text.into()),
            hybrid_config: Some(weights),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_vector_included(mut self) -> Self {
        self.include_vector = true;
        self
    }

    pub fn with_ef(mut self, ef: u32) -> Self {
        self.ef = Some(ef);
        self
    }

    pub fn with_probes(mut self, probes: u32) -> Self {
        self.probes = Some(probes);
        self
    }
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: VectorId,
    pub score: f64,
    pub metadata: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SearchRow {
    vector_id: String,
    metadata: Json<Payload>,
    document: Option<String>,
    embedding: Option<String>,
    score: f64,
}

impl SearchRow {
    pub(crate) fn into_result(self) -> Result<QueryResult> {
        let vector = self
            .embedding
            .as_deref()
            .map(Vector::parse_pg_literal)
            .transpose()?;
        Ok(QueryResult {
            id: self.vector_id,
            score: self.score,
            metadata: self.metadata.0,
            vector,
            document: self.document,
        })
    }
}

/// Session settings a query needs, applied with `set_config(.., true)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTuning {
    None,
    EfSearch(u32),
    Probes(u32),
}

impl SearchTuning {
    pub fn for_query(config: &IndexConfig, params: &QueryParams) -> Self {
        if params.search_mode == SearchMode::Text {
            return SearchTuning::None;
        }
        match config {
            IndexConfig::Flat => SearchTuning::None,
            IndexConfig::Hnsw(c) => SearchTuning::EfSearch(
                params
                    .ef
                    .unwrap_or_else(|| default_ef_search(params.top_k, c.m())),
            ),
            IndexConfig::IvfFlat(_) => params
                .probes
                .map(SearchTuning::Probes)
                .unwrap_or(SearchTuning::None),
        }
    }

    /// `(setting, value)` pairs.
    pub fn settings(&self) -> Vec<(&'static str, String)> {
        match self {
            SearchTuning::None => Vec::new(),
            SearchTuning::EfSearch(ef) => vec![("hnsw.ef_search", ef.to_string())],
            SearchTuning::Probes(probes) => vec![("ivfflat.probes", probes.to_string())],
        }
    }
}

/// `clamp(max(top_k, m * top_k), 1, 1000)`.
pub fn default_ef_search(top_k: u32, m: u32) -> u32 {
    top_k
        .max(m.saturating_mul(top_k))
        .clamp(1, MAX_EF_SEARCH)
}

/// A statement with its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStatement {
    pub sql: String,
    pub params: Params,
}

/// Builds search statements for one index.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    schema: &'a str,
    descriptor: &'a IndexDescriptor,
    vector_type: &'a VectorTypeRef,
    hybrid_pool: u32,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(
        schema: &'a str,
        descriptor: &'a IndexDescriptor,
        vector_type: &'a VectorTypeRef,
        hybrid_pool: u32,
    ) -> Self {
        Self {
            schema,
            descriptor,
            vector_type,
            hybrid_pool,
        }
    }

    /// Validates `params` and builds the statement for its search mode.
    pub fn build(&self, params: &QueryParams) -> Result<SearchStatement> {
        if params.top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".into()));
        }
        if !params.min_score.is_finite() {
            return Err(Error::InvalidArgument("min_score must be finite".into()));
        }

        match params.search_mode {
            SearchMode::Vector => self.vector_search(self.query_vector(params)?, params),
            SearchMode::Text => {
                let language = self.language()?;
                self.text_search(language, self.query_text(params)?, params)
            }
            SearchMode::Hybrid => {
                let language = self.language()?;
                let weights = params.hybrid_config.unwrap_or_default();
                weights.validate()?;
                self.hybrid_search(
                    self.query_vector(params)?,
                    language,
                    self.query_text(params)?,
                    weights,
                    params,
                )
            }
        }
    }

    fn query_vector<'p>(&self, params: &'p QueryParams) -> Result<&'p Vector> {
        let vector = params.vector.as_ref().ok_or_else(|| {
            Error::InvalidArgument("vector and hybrid search need a query vector".into())
        })?;
        vector.check_dimension(&self.descriptor.name, self.descriptor.dimension)?;
        Ok(vector)
    }

    fn query_text<'p>(&self, params: &'p QueryParams) -> Result<&'p str> {
        params
            .query_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidArgument("text and hybrid search need non-empty query text".into())
            })
    }

    fn language(&self) -> Result<&'a str> {
        self.descriptor
            .full_text_language
            .as_deref()
            .ok_or_else(|| Error::FullTextDisabled(self.descriptor.name.clone()))
    }

    fn table(&self) -> String {
        qualified(self.schema, &self.descriptor.name)
    }

    /// Output columns shared by every mode: vector_id, metadata, document, embedding.
    fn projection(&self, prefix: &str, include_vector: bool) -> String {
        let document = if self.descriptor.full_text_enabled() {
            format!("{prefix}{}", columns::DOCUMENT)
        } else {
            "NULL::text".to_string()
        };
        let embedding = if include_vector {
            format!("{prefix}{}::text", columns::EMBEDDING)
        } else {
            "NULL::text".to_string()
        };
        format!(
            "{prefix}{}, {prefix}{}, {document} AS document, {embedding} AS embedding",
            columns::VECTOR_ID,
            columns::METADATA
        )
    }

    fn filter_clause(&self, filter: Option<&Filter>, params: &mut Params) -> Result<String> {
        match filter {
            Some(filter) => translate(filter, params),
            None => Ok("TRUE".to_string()),
        }
    }

    fn vector_search(&self, vector: &Vector, params: &QueryParams) -> Result<SearchStatement> {
        let mut binds = Params::new();
        let query = self.vector_type.cast(&binds.text(vector.to_pg_literal()));
        let distance = self
            .vector_type
            .distance(self.descriptor.metric, columns::EMBEDDING, &query);
        let filter = self.filter_clause(params.filter.as_ref(), &mut binds)?;
        let min_score = binds.push(SqlParam::Float(params.min_score));
        let limit = binds.push(SqlParam::Int(params.top_k as i64));

        let sql = format!(
            "SELECT {projection}, (1 - {distance}) AS score \
             FROM {table} \
             WHERE {filter} AND (1 - {distance}) >= {min_score} \
             ORDER BY {distance} \
             LIMIT {limit}",
            projection = self.projection("", params.include_vector),
            table = self.table(),
        );
        Ok(SearchStatement { sql, params: binds })
    }

    fn text_search(&self, language: &str, text: &str, params: &QueryParams) -> Result<SearchStatement> {
        let mut binds = Params::new();
        let language = binds.text(language);
        let text = binds.text(text);
        let filter = self.filter_clause(params.filter.as_ref(), &mut binds)?;
        let min_score = binds.push(SqlParam::Float(params.min_score));
        let limit = binds.push(SqlParam::Int(params.top_k as i64));

        let sql = format!(
            "SELECT {projection}, ts_rank_cd({search}, tsq)::double precision AS score \
             FROM {table} CROSS JOIN websearch_to_tsquery({language}::regconfig, {text}) AS tsq \
             WHERE {search} @@ tsq AND {filter} AND ts_rank_cd({search}, tsq) >= {min_score} \
             ORDER BY score DESC \
             LIMIT {limit}",
            projection = self.projection("", params.include_vector),
            search = columns::SEARCH,
            table = self.table(),
        );
        Ok(SearchStatement { sql, params: binds })
    }

    fn hybrid_search(
        &self,
        vector: &Vector,
        language: &str,
        text: &str,
        weights: HybridConfig,
        params: &QueryParams,
    ) -> Result<SearchStatement> {
        let mut binds = Params::new();
        let query = self.vector_type.cast(&binds.text(vector.to_pg_literal()));
        let language = binds.text(language);
        let text = binds.text(text);
        let filter = self.filter_clause(params.filter.as_ref(), &mut binds)?;
        let pool = binds.push(SqlParam::Int(self.hybrid_pool.max(params.top_k) as i64));
        let semantic = binds.push(SqlParam::Float(weights.semantic_weight));
        let keyword = binds.push(SqlParam::Float(weights.keyword_weight));
        let min_score = binds.push(SqlParam::Float(params.min_score));
        let limit = binds.push(SqlParam::Int(params.top_k as i64));

        let metric = self.descriptor.metric;
        let distance = self.vector_type.distance(metric, columns::EMBEDDING, &query);
        let t_distance = self
            .vector_type
            .distance(metric, &format!("t.{}", columns::EMBEDDING), &query);
        let tsquery = format!("websearch_to_tsquery({language}::regconfig, {text})");
        let search = columns::SEARCH;
        let table = self.table();

        let sql = format!(
            "WITH vector_candidates AS (\
                SELECT id FROM {table} WHERE {filter} ORDER BY {distance} LIMIT {pool}\
             ), text_candidates AS (\
                SELECT id FROM {table} CROSS JOIN {tsquery} AS tsq \
                WHERE {search} @@ tsq AND {filter} \
                ORDER BY ts_rank_cd({search}, tsq) DESC LIMIT {pool}\
             ), candidates AS (\
                SELECT id FROM vector_candidates UNION SELECT id FROM text_candidates\
             ), scored AS (\
                SELECT {projection}, (1 - {t_distance}) AS vector_score, \
                       ts_rank_cd(t.{search}, {tsquery})::double precision AS text_score \
                FROM {table} AS t JOIN candidates c ON c.id = t.id\
             ), normalized AS (\
                SELECT *, \
                  CASE WHEN max(vector_score) OVER () > min(vector_score) OVER () \
                       THEN (vector_score - min(vector_score) OVER ()) / (max(vector_score) OVER () - min(vector_score) OVER ()) \
                       ELSE 1.0 END AS vector_norm, \
                  CASE WHEN max(text_score) OVER () > 0 \
                       THEN text_score / max(text_score) OVER () \
                       ELSE 0.0 END AS text_norm \
                FROM scored\
             ), fused AS (\
                SELECT vector_id, metadata, document, embedding, \
                       ({semantic} * vector_norm + {keyword} * text_norm)::double precision AS score \
                FROM normalized\
             ) \
             SELECT vector_id, metadata, document, embedding, score FROM fused \
             WHERE score >= {min_score} \
             ORDER BY score DESC \
             LIMIT {limit}",
            projection = self.projection("t.", params.include_vector),
        );
        Ok(SearchStatement { sql, params: binds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::index::{HnswConfig, IvfFlatConfig};

    fn descriptor(language: Option<&str>) -> IndexDescriptor {
        IndexDescriptor {
            name: "docs".into(),
            dimension: 3,
            metric: DistanceMetric::Cosine,
            config: IndexConfig::Hnsw(HnswConfig::new(16, 64)),
            count: 0,
            full_text_language: language.map(str::to_string),
        }
    }

    fn build(desc: &IndexDescriptor, params: &QueryParams) -> Result<SearchStatement> {
        let vt = VectorTypeRef::unqualified();
        QueryBuilder::new("public", desc, &vt, 20).build(params)
    }

    #[test]
    fn test_default_ef_search() {
        assert_eq!(default_ef_search(10, 16), 160);
        assert_eq!(default_ef_search(10, 0), 10);
        assert_eq!(default_ef_search(100, 16), 1000);
        assert_eq!(default_ef_search(0, 16), 1);
    }

    #[test]
    fn test_tuning_per_index_type() {
        let params = QueryParams::new(vec![1.0, 0.0, 0.0]);
        let hnsw = IndexConfig::Hnsw(HnswConfig::new(8, 32));
        assert_eq!(SearchTuning::for_query(&hnsw, &params), SearchTuning::EfSearch(80));
        assert_eq!(
            SearchTuning::for_query(&hnsw, &params.clone().with_ef(40)),
            SearchTuning::EfSearch(40)
        );

        let ivf = IndexConfig::IvfFlat(IvfFlatConfig::new(100));
        assert_eq!(SearchTuning::for_query(&ivf, &params), SearchTuning::None);
        assert_eq!(
            SearchTuning::for_query(&ivf, &params.clone().with_probes(7)),
            SearchTuning::Probes(7)
        );
        assert_eq!(
            SearchTuning::Probes(7).settings(),
            vec![("ivfflat.probes", "7".to_string())]
        );

        assert_eq!(SearchTuning::for_query(&IndexConfig::Flat, &params), SearchTuning::None);
        assert_eq!(
            SearchTuning::for_query(&hnsw, &QueryParams::text("rust")),
            SearchTuning::None
        );
    }

    #[test]
    fn test_vector_statement() {
        let desc = descriptor(None);
        let params = QueryParams::new(vec![1.0, 0.0, 0.0])
            .with_top_k(5)
            .with_filter(Filter::field("source_id").eq("doc1.pdf"));
        let stmt = build(&desc, &params).unwrap();

        assert!(stmt.sql.contains("(1 - (embedding <=> $1::vector)) AS score"));
        assert!(stmt.sql.contains("FROM \"public\".\"docs\""));
        assert!(stmt.sql.contains(">= $3"));
        assert!(stmt.sql.contains("ORDER BY (embedding <=> $1::vector)"));
        assert!(stmt.sql.ends_with("LIMIT $4"));
        assert!(stmt.sql.contains("NULL::text AS embedding"));
        assert_eq!(stmt.params.values()[0], SqlParam::Text("[1,0,0]".into()));
        assert_eq!(stmt.params.values()[3], SqlParam::Int(5));
    }

    #[test]
    fn test_vector_statement_includes_vector() {
        let desc = descriptor(None);
        let stmt = build(&desc, &QueryParams::new(vec![1.0, 0.0, 0.0]).with_vector_included()).unwrap();
        assert!(stmt.sql.contains("embedding::text AS embedding"));
    }

    #[test]
    fn test_vector_dimension_checked() {
        let desc = descriptor(None);
        let err = build(&desc, &QueryParams::new(vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_text_requires_full_text() {
        let err = build(&descriptor(None), &QueryParams::text("rust")).unwrap_err();
        assert!(matches!(err, Error::FullTextDisabled(name) if name == "docs"));

        let err = build(&descriptor(Some("english")), &QueryParams::text("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_text_statement() {
        let stmt = build(&descriptor(Some("english")), &QueryParams::text("rust async")).unwrap();
        assert!(stmt.sql.contains("websearch_to_tsquery($1::regconfig, $2) AS tsq"));
        assert!(stmt.sql.contains("document_tsv @@ tsq"));
        assert!(stmt.sql.contains("document AS document"));
        assert_eq!(stmt.params.values()[0], SqlParam::Text("english".into()));
        assert_eq!(stmt.params.values()[1], SqlParam::Text("rust async".into()));
    }

    #[test]
    fn test_hybrid_statement() {
        let params = QueryParams::hybrid(vec![1.0, 0.0, 0.0], "rust", HybridConfig::new(0.9, 0.1))
            .with_filter(Filter::field("lang").eq("en"));
        let stmt = build(&descriptor(Some("english")), &params).unwrap();

        assert!(stmt.sql.starts_with("WITH vector_candidates AS ("));
        // the filter is shared by both candidate pools and binds once
        assert_eq!(stmt.sql.matches("(metadata #> '{lang}') = $4").count(), 2);
        assert!(stmt.sql.contains("($6 * vector_norm + $7 * text_norm)"));
        assert_eq!(stmt.params.values()[4], SqlParam::Int(20));
        assert_eq!(stmt.params.values()[5], SqlParam::Float(0.9));
        assert_eq!(stmt.params.values()[6], SqlParam::Float(0.1));
        assert_eq!(stmt.params.len(), 9);
    }

    #[test]
    fn test_hybrid_weights_validated() {
        let params = QueryParams::hybrid(vec![1.0, 0.0, 0.0], "rust", HybridConfig::new(0.0, 0.0));
        assert!(build(&descriptor(Some("english")), &params).is_err());
        let params = QueryParams::hybrid(vec![1.0, 0.0, 0.0], "rust", HybridConfig::new(-1.0, 1.0));
        assert!(build(&descriptor(Some("english")), &params).is_err());
    }

    #[test]
    fn test_top_k_zero_rejected() {
        let err = build(&descriptor(None), &QueryParams::new(vec![1.0, 0.0, 0.0]).with_top_k(0));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_query_params_deserialize() {
        let params: QueryParams = serde_json::from_value(serde_json::json!({
            "query_vector": [1.0, 0.0, 0.0],
            "top_k": 3,
            "filter": {"source_id": "doc1.pdf"},
            "search_mode": "hybrid",
            "query_text": "rust",
            "hybrid_config": {"semantic_weight": 0.7}
        }))
        .unwrap();
        assert_eq!(params.top_k, 3);
        assert_eq!(params.search_mode, SearchMode::Hybrid);
        assert_eq!(params.hybrid_config, Some(HybridConfig::new(0.7, 0.5)));
        assert!(params.filter.is_some());
        assert_eq!(params.min_score, 0.0);
    }
}
