//! # pgvecstore Core
//!
//! Core library for pgvecstore, a document store on PostgreSQL and pgvector.
//!
//! Every index is one table. The crate manages those tables, translates a
//! structured filter language into parameterized SQL and runs vector, keyword
//! and hybrid searches against them.
//!
//! ## Core Types
//!
//! ### Store
//!
//! - [`VectorStore`] - Index lifecycle, mutations and search over a `PgPool`
//! - [`StoreConfig`] - Schema and search settings
//!
//! ### Indexes
//!
//! - [`IndexConfig`] - Flat, HNSW or IVFFlat
//! - [`IndexDescriptor`] - Dimension, metric, configuration and row count of an index
//! - [`IndexCatalog`] - Descriptor cache and per-name locks
//!
//! ### Querying
//!
//! - [`Filter`] - Metadata filter expressions, parsed from JSON or built fluently
//! - [`QueryParams`] - Search mode, `top_k`, thresholds and tuning
//! - [`QueryResult`] - One ranked hit
//!
//! ### Types
//!
//! - [`Vector`] - Owned embedding
//! - [`VectorId`] - Caller-visible id (a string)
//! - [`Payload`] - JSON metadata attached to a vector
//! - [`DistanceMetric`] - Cosine, Euclidean or DotProduct

pub mod config;
pub mod distance;
pub mod error;
pub mod extension;
pub mod filter;
pub mod ident;
pub mod index;
pub mod params;
pub mod payload;
pub mod query;
pub mod store;
pub mod vector;

pub use config::StoreConfig;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use extension::{ExtensionInfo, ExtensionManager, VectorTypeRef};
pub use filter::{Condition, Filter, RegexOptions};
pub use index::{
    HnswConfig, IndexCatalog, IndexConfig, IndexDescriptor, IndexKey, IndexType, IvfFlatConfig,
};
pub use params::{Params, SqlParam};
pub use payload::Payload;
pub use query::{
    HybridConfig, QueryBuilder, QueryParams, QueryResult, SearchMode, SearchStatement,
    SearchTuning,
};
pub use store::{CreateIndexParams, EffectiveTuning, UpsertParams, VectorStore, VectorUpdate};
pub use vector::{Vector, VectorId};

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use pgvecstore_core::prelude::*;
///
/// let filter = Filter::field("category").eq("A").and(Filter::field("year").gte(2020));
/// let params = QueryParams::new(vec![1.0, 0.0, 0.0])
///     .with_top_k(5)
///     .with_filter(filter);
/// assert_eq!(params.search_mode, SearchMode::Vector);
/// ```
pub mod prelude {
    pub use crate::{
        CreateIndexParams, DistanceMetric, Error, Filter, HnswConfig, HybridConfig, IndexConfig,
        IndexDescriptor, IvfFlatConfig, Payload, QueryParams, QueryResult, Result, SearchMode,
        StoreConfig, UpsertParams, Vector, VectorId, VectorStore, VectorUpdate,
    };
}
