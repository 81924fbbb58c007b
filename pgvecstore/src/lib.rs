//! # pgvecstore
//!
//! **A document store for RAG workloads on PostgreSQL and pgvector.**
//!
//! pgvecstore manages one table per index and searches it three ways:
//!
//! - **Vector search** - nearest neighbours under the index metric
//! - **Text search** - `websearch_to_tsquery` ranked with `ts_rank_cd`
//! - **Hybrid search** - both scores normalized and fused with configurable weights
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Index Types** | Flat (exact scan), HNSW and IVFFlat |
//! | **Distance Metrics** | Cosine, Euclidean, DotProduct |
//! | **Filtered Search** | MongoDB-style metadata filters compiled to parameterized SQL |
//! | **Atomic Replace** | Delete-by-filter and insert in one transaction |
//! | **Search Tuning** | `ef_search` and `probes` applied per query, inside its transaction |
//!
//! ## Quick Start
//!
//! ```no_run
//! use pgvecstore::prelude::*;
//! use sqlx::postgres::PgPoolOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pool = PgPoolOptions::new()
//!         .max_connections(5)
//!         .connect("postgres://localhost/vectors")
//!         .await?;
//!     let store = VectorStore::new(pool, StoreConfig::default())?;
//!
//!     // An HNSW index over 3-dimensional embeddings, with keyword search
//!     store
//!         .create_index(CreateIndexParams::new("docs", 3).with_full_text("english"))
//!         .await?;
//!
//!     store
//!         .upsert(
//!             "docs",
//!             UpsertParams::new(vec![vec![0.9, 0.1, 0.0].into(), vec![0.1, 0.9, 0.0].into()])
//!                 .with_ids(vec!["intro", "advanced"])
//!                 .with_metadata(vec![
//!                     Payload::new().with_field("category", "rust"),
//!                     Payload::new().with_field("category", "python"),
//!                 ])
//!                 .with_documents(vec!["Introduction to Rust", "Advanced Python"]),
//!         )
//!         .await?;
//!
//!     let hits = store
//!         .query(
//!             "docs",
//!             QueryParams::new(vec![1.0, 0.0, 0.0])
//!                 .with_top_k(1)
//!                 .with_filter(Filter::field("category").eq("rust")),
//!         )
//!         .await?;
//!     assert_eq!(hits[0].id, "intro");
//!     Ok(())
//! }
//! ```
//!
//! ### Filters
//!
//! Filters are parsed from JSON or built fluently; both produce the same tree:
//!
//! ```rust
//! use pgvecstore::prelude::*;
//! use serde_json::json;
//!
//! let parsed = Filter::from_json(&json!({
//!     "$and": [{"category": "rust"}, {"year": {"$gte": 2020}}]
//! }))
//! .unwrap();
//! let built = Filter::field("category").eq("rust").and(Filter::field("year").gte(2020));
//! assert_eq!(parsed, built);
//! ```
//!
//! ### Hybrid Search
//!
//! ```no_run
//! # use pgvecstore::prelude::*;
//! # async fn run(store: VectorStore) -> Result<()> {
//! let weights = HybridConfig::new(0.7, 0.3);
//! let hits = store
//!     .query("docs", QueryParams::hybrid(vec![1.0, 0.0, 0.0], "rust tutorial", weights))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! pgvecstore is organized into three crates:
//!
//! - **`pgvecstore-core`** - The store, filter translator and query builder
//! - **`pgvecstore`** - Main crate that re-exports everything
//! - **`pgvecstore-server`** - HTTP surface over a store
//!
//! ### Core Components
//!
//! - [`VectorStore`] - Index lifecycle, mutations and search
//! - [`Filter`] - Metadata filter expressions
//! - [`QueryBuilder`] - SQL for the three search modes
//! - [`ExtensionManager`] - Installs and locates the `vector` extension
//! - [`IndexCatalog`] - Descriptor cache and per-name create/build locks
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](crate::Result), which uses
//! the [`Error`] enum for error types.
//!
//! ## Thread Safety
//!
//! [`VectorStore`] is `Clone` and safe to share across tasks. Creating or
//! rebuilding the same index from several tasks runs the work once.

// Re-export everything from core
pub use pgvecstore_core::*;
