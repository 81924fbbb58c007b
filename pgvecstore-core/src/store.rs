//! The [`VectorStore`] facade.
//!
//! One store owns a connection pool, the index catalog and the extension
//! state. It is cheap to clone; clones share everything.
//!
//! # Example
//!
//! ```rust,no_run
//! use pgvecstore_core::prelude::*;
//! use sqlx::PgPool;
//!
//! # async fn run(pool: PgPool) -> Result<()> {
//! let store = VectorStore::new(pool, StoreConfig::default())?;
//! store
//!     .create_index(CreateIndexParams::new("docs", 3).with_metric(DistanceMetric::Cosine))
//!     .await?;
//!
//! let ids = store
//!     .upsert(
//!         "docs",
//!         UpsertParams::new(vec![vec![1.0, 0.0, 0.0].into()])
//!             .with_metadata(vec![Payload::new().with_field("source", "a.pdf")]),
//!     )
//!     .await?;
//!
//! let hits = store
//!     .query("docs", QueryParams::new(vec![1.0, 0.0, 0.0]).with_top_k(5))
//!     .await?;
//! assert_eq!(hits[0].id, ids[0]);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::types::Json;
use sqlx::{PgPool, Transaction};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::StoreConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::extension::{ExtensionManager, VectorTypeRef};
use crate::filter::{translate, Filter};
use crate::ident::{qualified, validate_index_name, validate_language};
use crate::index::{
    columns, ddl, language_from_generation, metric_from_comment, IndexCatalog, IndexConfig,
    IndexDescriptor, IndexKey, TableShape, MAX_DIMENSION,
};
use crate::params::Params;
use crate::payload::Payload;
use crate::query::{QueryBuilder, QueryParams, QueryResult, SearchRow, SearchTuning};
use crate::vector::{Vector, VectorId};

/// Text-search configuration used when a generated column cannot be parsed.
const FALLBACK_LANGUAGE: &str = "simple";

/// Arguments of [`VectorStore::create_index`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateIndexParams {
    #[serde(alias = "index_name")]
    pub name: String,
    pub dimension: u32,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default, alias = "index_config")]
    pub config: IndexConfig,
    /// Build the ANN structure right away. Defaults to true.
    #[serde(default = "default_build_index")]
    pub build_index: bool,
    /// Enables keyword and hybrid search with this text-search configuration.
    #[serde(default)]
    pub full_text_language: Option<String>,
}

fn default_build_index() -> bool {
    true
}

impl CreateIndexParams {
    pub fn new<S: Into<String>>(name: S, dimension: u32) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: DistanceMetric::default(),
            config: IndexConfig::default(),
            build_index: true,
            full_text_language: None,
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates the table only; call [`VectorStore::build_index`] later.
    pub fn without_build(mut self) -> Self {
        self.build_index = false;
        self
    }

    pub fn with_full_text<S: Into<String>>(mut self, language: S) -> Self {
        self.full_text_language = Some(language.into());
        self
    }

    fn key(&self) -> IndexKey {
        IndexKey::new(
            &self.name,
            self.dimension,
            self.metric,
            self.config.index_type(),
            self.full_text_language.as_deref(),
        )
    }
}

/// Arguments of [`VectorStore::upsert`].
///
/// `metadata`, `ids` and `documents` are parallel to `vectors` when present.
/// Missing ids are generated.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpsertParams {
    pub vectors: Vec<Vector>,
    pub metadata: Option<Vec<Payload>>,
    pub ids: Option<Vec<VectorId>>,
    pub documents: Option<Vec<Option<String>>>,
    /// Rows matching this filter are deleted in the same transaction first.
    pub delete_filter: Option<Filter>,
}

impl UpsertParams {
    pub fn new(vectors: Vec<Vector>) -> Self {
        Self {
            vectors,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Vec<Payload>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_ids<I: Into<VectorId>>(mut self, ids: Vec<I>) -> Self {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_documents<S: Into<String>>(mut self, documents: Vec<S>) -> Self {
        self.documents = Some(documents.into_iter().map(|d| Some(d.into())).collect());
        self
    }

    /// Replaces everything matching `filter` with this batch.
    pub fn replacing(mut self, filter: Filter) -> Self {
        self.delete_filter = Some(filter);
        self
    }

    fn check_lengths(&self) -> Result<()> {
        let expected = self.vectors.len();
        let mismatch = |what: &str, len: usize| {
            Error::InvalidArgument(format!(
                "{what} has {len} entries but {expected} vectors were given"
            ))
        };
        if let Some(m) = &self.metadata {
            if m.len() != expected {
                return Err(mismatch("metadata", m.len()));
            }
        }
        if let Some(ids) = &self.ids {
            if ids.len() != expected {
                return Err(mismatch("ids", ids.len()));
            }
            if ids.iter().any(|id| id.is_empty()) {
                return Err(Error::InvalidArgument("ids must not be empty".into()));
            }
        }
        if let Some(d) = &self.documents {
            if d.len() != expected {
                return Err(mismatch("documents", d.len()));
            }
        }
        Ok(())
    }
}

/// Arguments of [`VectorStore::update_vector`]. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VectorUpdate {
    pub vector: Option<Vector>,
    pub metadata: Option<Payload>,
}

impl VectorUpdate {
    pub fn vector<V: Into<Vector>>(vector: V) -> Self {
        Self {
            vector: Some(vector.into()),
            metadata: None,
        }
    }

    pub fn metadata(metadata: Payload) -> Self {
        Self {
            vector: None,
            metadata: Some(metadata),
        }
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Planner settings observed inside a query transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EffectiveTuning {
    pub ef_search: Option<String>,
    pub probes: Option<String>,
}

#[derive(Debug)]
struct StoreInner {
    pool: PgPool,
    config: StoreConfig,
    catalog: IndexCatalog,
    extension: ExtensionManager,
    schema_ready: AtomicBool,
    schema_lock: AsyncMutex<()>,
    warmup: Mutex<Option<JoinHandle<()>>>,
}

/// A pgvector-backed document store.
#[derive(Debug, Clone)]
pub struct VectorStore {
    inner: Arc<StoreInner>,
}

impl VectorStore {
    /// Creates a store over `pool`.
    ///
    /// When `config.warmup` is set and a tokio runtime is running, existing
    /// indexes are discovered in the background; [`wait_for_warmup`]
    /// waits for that to finish.
    ///
    /// [`wait_for_warmup`]: VectorStore::wait_for_warmup
    pub fn new(pool: PgPool, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let warmup = config.warmup;
        let store = Self {
            inner: Arc::new(StoreInner {
                pool,
                config,
                catalog: IndexCatalog::new(),
                extension: ExtensionManager::new(),
                schema_ready: AtomicBool::new(false),
                schema_lock: AsyncMutex::new(()),
                warmup: Mutex::new(None),
            }),
        };

        if warmup {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let background = store.clone();
                let task = handle.spawn(async move {
                    if let Err(e) = background.warm().await {
                        warn!(error = %e, "index warmup failed");
                    }
                });
                *store.inner.warmup.lock() = Some(task);
            }
        }
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.inner.catalog
    }

    fn schema(&self) -> &str {
        &self.inner.config.schema
    }

    fn table(&self, name: &str) -> String {
        qualified(self.schema(), name)
    }

    /// Waits for the background warmup started by [`VectorStore::new`].
    pub async fn wait_for_warmup(&self) {
        let task = self.inner.warmup.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "index warmup task did not complete");
            }
        }
    }

    /// Stops the warmup and closes the pool.
    pub async fn disconnect(&self) {
        if let Some(task) = self.inner.warmup.lock().take() {
            task.abort();
        }
        self.inner.pool.close().await;
        info!("vector store disconnected");
    }

    async fn warm(&self) -> Result<()> {
        let names = self.list_indexes().await?;
        for name in &names {
            let _create = self.inner.catalog.lock_create(name).await;
            match self.load_descriptor(name).await {
                Ok(descriptor) => {
                    if !self.inner.catalog.adopt(descriptor) {
                        debug!(index = %name, "index already known, keeping newer state");
                    }
                }
                Err(e) => warn!(index = %name, error = %e, "could not describe index during warmup"),
            }
        }
        info!(indexes = names.len(), "index warmup complete");
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        if self.inner.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.inner.schema_lock.lock().await;
        if self.inner.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let schema = self.schema();
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)")
                .bind(schema)
                .fetch_one(&self.inner.pool)
                .await?;
        if !exists {
            sqlx::query(&ddl::create_schema(schema))
                .execute(&self.inner.pool)
                .await
                .map_err(|e| match Error::from_database(schema, e) {
                    Error::Permission(msg) => {
                        Error::Permission(format!("cannot create schema {schema:?}: {msg}"))
                    }
                    other => other,
                })?;
            info!(schema, "created schema");
        }
        self.inner.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn vector_type(&self) -> Result<VectorTypeRef> {
        let info = self.inner.extension.ensure(&self.inner.pool).await?;
        Ok(info.type_ref(self.schema()))
    }

    /// Creates an index. A call matching the last successful create for the
    /// same name does nothing and does not touch the database.
    #[instrument(skip(self, params), fields(index = %params.name, dimension = params.dimension))]
    pub async fn create_index(&self, params: CreateIndexParams) -> Result<()> {
        validate_index_name(&params.name)?;
        if params.dimension == 0 || params.dimension > MAX_DIMENSION {
            return Err(Error::InvalidDimension(params.dimension));
        }
        if let Some(language) = &params.full_text_language {
            validate_language(language)?;
        }

        let created = self
            .inner
            .catalog
            .create_once(&params.name, params.key(), || self.create_table(&params))
            .await?;
        if created {
            info!(
                metric = %params.metric,
                index_type = params.config.index_type().as_str(),
                full_text = params.full_text_language.is_some(),
                "index created"
            );
        }
        Ok(())
    }

    async fn create_table(&self, params: &CreateIndexParams) -> Result<()> {
        let name = params.name.as_str();
        self.ensure_schema().await?;
        let extension = self.inner.extension.ensure(&self.inner.pool).await?;
        if params.build_index && matches!(params.config, IndexConfig::Hnsw(_)) {
            extension.require_hnsw()?;
        }
        let vector_type = extension.type_ref(self.schema());

        let mut stale_ann = false;
        if let Some(shape) = self.load_shapes(Some(name)).await?.remove(name) {
            self.check_existing(params, &shape).await?;
            if !params.build_index {
                let current = self.load_descriptor(name).await?;
                stale_ann = current.metric != params.metric
                    || current.config.index_type() != params.config.index_type();
            }
        }

        let mut statements = vec![ddl::create_table(
            self.schema(),
            name,
            params.dimension,
            &vector_type,
        )];
        if let Some(language) = &params.full_text_language {
            statements.extend(ddl::add_full_text_columns(self.schema(), name, language));
        }
        if stale_ann {
            debug!("metric or index type changed, dropping ANN index");
            statements.push(ddl::drop_ann_index(self.schema(), name));
        }
        statements.push(ddl::comment_metric(self.schema(), name, params.metric));

        let mut tx = self.inner.pool.begin().await?;
        for sql in &statements {
            debug!(sql = %sql, "executing");
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::from_database(name, e))?;
        }
        tx.commit().await?;
        self.inner.catalog.invalidate(name);

        if params.build_index {
            let _build = self.inner.catalog.lock_build(name).await;
            self.rebuild(name, params.metric, &params.config, &vector_type)
                .await?;
        }
        Ok(())
    }

    async fn check_existing(&self, params: &CreateIndexParams, shape: &TableShape) -> Result<()> {
        let name = params.name.as_str();
        if !shape.is_managed() {
            return Err(Error::IndexConflict(format!(
                "table {} exists but is not a managed index",
                self.table(name)
            )));
        }
        let (dimension, _) = self.embedding_column(name).await?;
        if dimension != params.dimension {
            return Err(Error::IndexConflict(format!(
                "index {name} exists with dimension {dimension}, requested {}",
                params.dimension
            )));
        }
        if shape.has_full_text() {
            if let Some(requested) = &params.full_text_language {
                let existing = self.full_text_language(name).await?;
                if &existing != requested {
                    return Err(Error::IndexConflict(format!(
                        "index {name} uses text search configuration {existing}, requested {requested}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Drops and rebuilds the ANN structure of `name`.
    #[instrument(skip(self, config), fields(index = %name, metric = %metric))]
    pub async fn build_index(
        &self,
        name: &str,
        metric: DistanceMetric,
        config: IndexConfig,
    ) -> Result<()> {
        validate_index_name(name)?;
        let _build = self.inner.catalog.lock_build(name).await;

        let current = self.load_descriptor(name).await?;
        let extension = self.inner.extension.ensure(&self.inner.pool).await?;
        if matches!(config, IndexConfig::Hnsw(_)) {
            extension.require_hnsw()?;
        }
        let resolved = self
            .rebuild(name, metric, &config, &extension.type_ref(self.schema()))
            .await?;

        let descriptor = IndexDescriptor {
            metric,
            config: resolved,
            count: 0,
            ..current
        };
        self.inner.catalog.mark_created(name, descriptor.key());
        self.inner.catalog.cache_descriptor(descriptor);
        info!(index_type = resolved.index_type().as_str(), "index built");
        Ok(())
    }

    async fn rebuild(
        &self,
        name: &str,
        metric: DistanceMetric,
        config: &IndexConfig,
        vector_type: &VectorTypeRef,
    ) -> Result<IndexConfig> {
        let rows = if config.needs_row_count() {
            self.row_count(name).await?
        } else {
            0
        };
        let resolved = config.resolve(rows);

        let mut statements = vec![ddl::drop_ann_index(self.schema(), name)];
        statements.extend(ddl::create_ann_index(
            self.schema(),
            name,
            metric,
            &resolved,
            vector_type,
        ));
        statements.push(ddl::comment_metric(self.schema(), name, metric));

        let mut tx = self.inner.pool.begin().await?;
        for sql in &statements {
            debug!(sql = %sql, "executing");
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::from_database(name, e))?;
        }
        tx.commit().await?;
        Ok(resolved)
    }

    /// Describes `name`, with a live row count.
    #[instrument(skip(self))]
    pub async fn describe_index(&self, name: &str) -> Result<IndexDescriptor> {
        validate_index_name(name)?;
        let mut descriptor = self.descriptor(name).await?;
        descriptor.count = self.row_count(name).await?;
        Ok(descriptor)
    }

    /// Names of the managed indexes in the store's schema, sorted.
    #[instrument(skip(self))]
    pub async fn list_indexes(&self) -> Result<Vec<String>> {
        let shapes = self.load_shapes(None).await?;
        Ok(shapes
            .into_iter()
            .filter(|(_, shape)| shape.is_managed())
            .map(|(name, _)| name)
            .collect())
    }

    /// Drops `name` and everything cached about it. A missing table is not an error.
    #[instrument(skip(self))]
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        validate_index_name(name)?;
        match self.load_shapes(Some(name)).await?.remove(name) {
            None => debug!("index does not exist"),
            Some(shape) if !shape.is_managed() => {
                return Err(Error::IndexNotFound(name.to_string()))
            }
            Some(_) => {
                sqlx::query(&ddl::drop_table(self.schema(), name))
                    .execute(&self.inner.pool)
                    .await
                    .map_err(|e| Error::from_database(name, e))?;
                info!("index deleted");
            }
        }
        self.inner.catalog.forget(name);
        Ok(())
    }

    /// Removes every row of `name`, keeping its definition.
    #[instrument(skip(self))]
    pub async fn truncate_index(&self, name: &str) -> Result<()> {
        validate_index_name(name)?;
        self.descriptor(name).await?;
        sqlx::query(&ddl::truncate_table(self.schema(), name))
            .execute(&self.inner.pool)
            .await
            .map_err(|e| Error::from_database(name, e))?;
        info!("index truncated");
        Ok(())
    }

    /// Inserts or replaces a batch and returns its ids.
    ///
    /// Everything happens in one transaction: the optional `delete_filter`
    /// delete, then one `INSERT .. ON CONFLICT` per row. Any failure leaves
    /// the index as it was.
    #[instrument(skip(self, params), fields(index = %name, batch = params.vectors.len()))]
    pub async fn upsert(&self, name: &str, params: UpsertParams) -> Result<Vec<VectorId>> {
        validate_index_name(name)?;
        params.check_lengths()?;
        let descriptor = self.descriptor(name).await?;
        for vector in &params.vectors {
            vector.validate()?;
            vector.check_dimension(name, descriptor.dimension)?;
        }
        if params.documents.is_some() && !descriptor.full_text_enabled() {
            return Err(Error::FullTextDisabled(name.to_string()));
        }

        let delete = match &params.delete_filter {
            Some(filter) if filter.is_empty() => {
                return Err(Error::EmptyDeleteFilter(name.to_string()))
            }
            Some(filter) => {
                let mut binds = Params::new();
                let predicate = translate(filter, &mut binds)?;
                Some((
                    format!("DELETE FROM {} WHERE {predicate}", self.table(name)),
                    binds,
                ))
            }
            None => None,
        };

        let UpsertParams {
            vectors,
            metadata,
            ids,
            documents,
            ..
        } = params;
        let ids: Vec<VectorId> = ids.unwrap_or_else(|| {
            (0..vectors.len())
                .map(|_| uuid::Uuid::new_v4().to_string())
                .collect()
        });
        let mut metadata = metadata.map(Vec::into_iter);
        let mut documents = documents.map(Vec::into_iter);

        let vector_type = self.vector_type().await?;
        let insert = self.insert_statement(name, documents.is_some(), &vector_type);

        let mut tx = self.inner.pool.begin().await?;
        if let Some((sql, binds)) = delete {
            let removed = sqlx::query_with(&sql, binds.into_arguments()?)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::from_database(name, e))?
                .rows_affected();
            debug!(removed, "deleted rows before upsert");
        }

        for (id, vector) in ids.iter().zip(&vectors) {
            let payload = metadata
                .as_mut()
                .and_then(Iterator::next)
                .unwrap_or_default();
            let mut query = sqlx::query(&insert)
                .bind(id)
                .bind(vector.to_pg_literal())
                .bind(Json(payload));
            if let Some(documents) = documents.as_mut() {
                query = query.bind(documents.next().flatten());
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::from_database(name, e))?;
        }
        tx.commit().await?;

        debug!(count = ids.len(), "upserted vectors");
        Ok(ids)
    }

    fn insert_statement(&self, name: &str, with_document: bool, vector_type: &VectorTypeRef) -> String {
        let (document_column, document_value, document_update) = if with_document {
            (
                format!(", {}", columns::DOCUMENT),
                ", $4".to_string(),
                format!(", {0} = EXCLUDED.{0}", columns::DOCUMENT),
            )
        } else {
            Default::default()
        };
        format!(
            "INSERT INTO {table} ({vector_id}, {embedding}, {metadata}{document_column}) \
             VALUES ($1, {cast}, $3{document_value}) \
             ON CONFLICT ({vector_id}) DO UPDATE SET \
             {embedding} = EXCLUDED.{embedding}, {metadata} = EXCLUDED.{metadata}{document_update}",
            table = self.table(name),
            vector_id = columns::VECTOR_ID,
            embedding = columns::EMBEDDING,
            metadata = columns::METADATA,
            cast = vector_type.cast("$2"),
        )
    }

    /// Replaces the vector and/or metadata of one row.
    #[instrument(skip(self, update), fields(index = %name))]
    pub async fn update_vector(&self, name: &str, id: &str, update: VectorUpdate) -> Result<()> {
        validate_index_name(name)?;
        if update.vector.is_none() && update.metadata.is_none() {
            return Err(Error::EmptyUpdate {
                index: name.to_string(),
                id: id.to_string(),
            });
        }
        let descriptor = self.descriptor(name).await?;

        let mut binds = Params::new();
        let mut assignments = Vec::new();
        if let Some(vector) = &update.vector {
            vector.validate()?;
            vector.check_dimension(name, descriptor.dimension)?;
            let vector_type = self.vector_type().await?;
            let placeholder = binds.text(vector.to_pg_literal());
            assignments.push(format!("{} = {}", columns::EMBEDDING, vector_type.cast(&placeholder)));
        }
        if let Some(metadata) = update.metadata {
            let placeholder = binds.json(metadata.to_value());
            assignments.push(format!("{} = {placeholder}", columns::METADATA));
        }
        let id_placeholder = binds.text(id);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {id_placeholder}",
            self.table(name),
            assignments.join(", "),
            columns::VECTOR_ID
        );
        let updated = sqlx::query_with(&sql, binds.into_arguments()?)
            .execute(&self.inner.pool)
            .await
            .map_err(|e| Error::from_database(name, e))?
            .rows_affected();
        if updated == 0 {
            return Err(Error::VectorNotFound {
                index: name.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Deletes one row. Returns false if `id` was not present.
    #[instrument(skip(self), fields(index = %name))]
    pub async fn delete_vector(&self, name: &str, id: &str) -> Result<bool> {
        validate_index_name(name)?;
        self.descriptor(name).await?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            self.table(name),
            columns::VECTOR_ID
        );
        let deleted = sqlx::query(&sql)
            .bind(id)
            .execute(&self.inner.pool)
            .await
            .map_err(|e| Error::from_database(name, e))?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Deletes every row matching `filter` and returns how many went.
    #[instrument(skip(self, filter), fields(index = %name))]
    pub async fn delete_vectors_by_filter(&self, name: &str, filter: &Filter) -> Result<u64> {
        validate_index_name(name)?;
        if filter.is_empty() {
            return Err(Error::EmptyDeleteFilter(name.to_string()));
        }
        self.descriptor(name).await?;

        let mut binds = Params::new();
        let predicate = translate(filter, &mut binds)?;
        let sql = format!("DELETE FROM {} WHERE {predicate}", self.table(name));
        let deleted = sqlx::query_with(&sql, binds.into_arguments()?)
            .execute(&self.inner.pool)
            .await
            .map_err(|e| Error::from_database(name, e))?
            .rows_affected();
        info!(deleted, "deleted vectors by filter");
        Ok(deleted)
    }

    /// Runs a vector, text or hybrid search.
    #[instrument(
        skip(self, params),
        fields(index = %name, mode = ?params.search_mode, top_k = params.top_k)
    )]
    pub async fn query(&self, name: &str, params: QueryParams) -> Result<Vec<QueryResult>> {
        validate_index_name(name)?;
        let descriptor = self.descriptor(name).await?;
        let vector_type = self.vector_type().await?;
        let statement = QueryBuilder::new(
            self.schema(),
            &descriptor,
            &vector_type,
            self.inner.config.hybrid_pool(params.top_k),
        )
        .build(&params)?;
        let tuning = SearchTuning::for_query(&descriptor.config, &params);

        let mut tx = self.inner.pool.begin().await?;
        apply_tuning(&mut tx, tuning).await?;
        debug!(sql = %statement.sql, params = statement.params.len(), "searching");
        let rows: Vec<SearchRow> =
            sqlx::query_as_with(&statement.sql, statement.params.into_arguments()?)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| Error::from_database(name, e))?;
        tx.commit().await?;

        rows.into_iter().map(SearchRow::into_result).collect()
    }

    /// Applies the tuning `params` would get and reports the settings seen
    /// inside that transaction. The transaction is rolled back.
    #[instrument(skip(self, params), fields(index = %name))]
    pub async fn inspect_search_tuning(
        &self,
        name: &str,
        params: &QueryParams,
    ) -> Result<EffectiveTuning> {
        validate_index_name(name)?;
        let descriptor = self.descriptor(name).await?;
        let tuning = SearchTuning::for_query(&descriptor.config, params);

        let mut tx = self.inner.pool.begin().await?;
        apply_tuning(&mut tx, tuning).await?;
        let (ef_search, probes): (Option<String>, Option<String>) = sqlx::query_as(
            "SELECT current_setting('hnsw.ef_search', true), current_setting('ivfflat.probes', true)",
        )
        .fetch_one(&mut *tx)
        .await?;
        tx.rollback().await?;
        Ok(EffectiveTuning { ef_search, probes })
    }

    /// Drops the create and build lock entries for `name`.
    pub fn prune_locks(&self, name: &str) {
        self.inner.catalog.prune_locks(name);
    }

    /// Cached shape of `name`, loading it from the catalog on a miss.
    async fn descriptor(&self, name: &str) -> Result<IndexDescriptor> {
        if let Some(descriptor) = self.inner.catalog.descriptor(name) {
            return Ok(descriptor);
        }
        let descriptor = self.load_descriptor(name).await?;
        self.inner.catalog.cache_descriptor(descriptor.clone());
        Ok(descriptor)
    }

    async fn load_descriptor(&self, name: &str) -> Result<IndexDescriptor> {
        let shape = self
            .load_shapes(Some(name))
            .await?
            .remove(name)
            .filter(TableShape::is_managed)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;

        let (dimension, comment) = self.embedding_column(name).await?;
        let ann: Option<(String, String, Vec<String>)> = sqlx::query_as(
            "SELECT am.amname::text, opc.opcname::text, COALESCE(ic.reloptions, '{}'::text[]) \
             FROM pg_index i \
             JOIN pg_class ic ON ic.oid = i.indexrelid \
             JOIN pg_namespace n ON n.oid = ic.relnamespace \
             JOIN pg_am am ON am.oid = ic.relam \
             JOIN pg_opclass opc ON opc.oid = i.indclass[0] \
             WHERE n.nspname = $1 AND ic.relname = $2",
        )
        .bind(self.schema())
        .bind(ddl::ann_index_name(name))
        .fetch_optional(&self.inner.pool)
        .await?;

        let metric = comment
            .as_deref()
            .and_then(metric_from_comment)
            .or_else(|| {
                ann.as_ref()
                    .and_then(|(_, opclass, _)| DistanceMetric::from_ops_class(opclass))
            })
            .unwrap_or_default();
        let config = ann
            .as_ref()
            .and_then(|(method, _, options)| IndexConfig::from_catalog(method, options))
            .unwrap_or(IndexConfig::Flat);
        let full_text_language = if shape.has_full_text() {
            Some(self.full_text_language(name).await?)
        } else {
            None
        };

        Ok(IndexDescriptor {
            name: name.to_string(),
            dimension,
            metric,
            config,
            count: 0,
            full_text_language,
        })
    }

    /// Declared dimension and comment of the embedding column.
    async fn embedding_column(&self, name: &str) -> Result<(u32, Option<String>)> {
        let row: Option<(i32, Option<String>)> = sqlx::query_as(
            "SELECT a.atttypmod, col_description(a.attrelid, a.attnum) \
             FROM pg_attribute a \
             WHERE a.attrelid = to_regclass($1) AND a.attname = $2 AND NOT a.attisdropped",
        )
        .bind(self.table(name))
        .bind(columns::EMBEDDING)
        .fetch_optional(&self.inner.pool)
        .await?;

        let (typmod, comment) = row.ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        let dimension = u32::try_from(typmod)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                Error::IndexConflict(format!("embedding column of {name} has no declared dimension"))
            })?;
        Ok((dimension, comment))
    }

    async fn full_text_language(&self, name: &str) -> Result<String> {
        let expression: Option<String> = sqlx::query_scalar(
            "SELECT pg_get_expr(d.adbin, d.adrelid) \
             FROM pg_attrdef d \
             JOIN pg_attribute a ON a.attrelid = d.adrelid AND a.attnum = d.adnum \
             WHERE d.adrelid = to_regclass($1) AND a.attname = $2",
        )
        .bind(self.table(name))
        .bind(columns::SEARCH)
        .fetch_optional(&self.inner.pool)
        .await?;

        Ok(expression
            .as_deref()
            .and_then(language_from_generation)
            .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string()))
    }

    async fn row_count(&self, name: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT count(*) FROM {}", self.table(name)))
            .fetch_one(&self.inner.pool)
            .await
            .map_err(|e| Error::from_database(name, e))?;
        Ok(count.max(0) as u64)
    }

    /// Table shapes in the store's schema, optionally restricted to one name.
    async fn load_shapes(&self, name: Option<&str>) -> Result<BTreeMap<String, TableShape>> {
        let columns: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT c.relname::text, a.attname::text, t.typname::text \
             FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_attribute a ON a.attrelid = c.oid \
             JOIN pg_type t ON t.oid = a.atttypid \
             WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') \
               AND a.attnum > 0 AND NOT a.attisdropped \
               AND ($2::text IS NULL OR c.relname = $2) \
             ORDER BY c.relname, a.attnum",
        )
        .bind(self.schema())
        .bind(name)
        .fetch_all(&self.inner.pool)
        .await?;

        let unique: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT c.relname::text \
             FROM pg_index i \
             JOIN pg_class c ON c.oid = i.indrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = i.indkey[0] \
             WHERE n.nspname = $1 AND i.indisunique AND i.indnatts = 1 AND a.attname = $2 \
               AND ($3::text IS NULL OR c.relname = $3)",
        )
        .bind(self.schema())
        .bind(columns::VECTOR_ID)
        .bind(name)
        .fetch_all(&self.inner.pool)
        .await?
        .into_iter()
        .collect();

        let mut shapes: BTreeMap<String, TableShape> = BTreeMap::new();
        for (table, column, type_name) in columns {
            let shape = shapes.entry(table.clone()).or_default();
            shape.unique_vector_id = unique.contains(&table);
            shape.columns.push((column, type_name));
        }
        Ok(shapes)
    }
}

/// Sets transaction-local planner settings.
async fn apply_tuning(tx: &mut Transaction<'_, Postgres>, tuning: SearchTuning) -> Result<()> {
    for (setting, value) in tuning.settings() {
        debug!(setting, value = %value, "applying search tuning");
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(setting)
            .bind(value)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
