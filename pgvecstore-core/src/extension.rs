//! Detection and installation of the `vector` extension.
//!
//! The extension may live in a different schema from the managed tables
//! (hosted databases often install it into `extensions`). When it does, the
//! type name, distance operators and operator classes must be qualified,
//! which is what [`VectorTypeRef`] renders.

use parking_lot::RwLock;
use sqlx::PgPool;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::ident::quote;

/// Name of the pgvector extension.
pub const EXTENSION_NAME: &str = "vector";

/// First pgvector release with HNSW support.
pub const HNSW_MIN_VERSION: (u32, u32, u32) = (0, 5, 0);

/// What is known about the installed extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// `pg_extension.extversion`, when detected.
    pub version: Option<String>,
    /// Schema owning the extension, when detected.
    pub schema: Option<String>,
}

impl ExtensionInfo {
    /// Returns true if the extension was found in `pg_extension`.
    pub fn is_detected(&self) -> bool {
        self.version.is_some()
    }

    /// Parsed `major.minor.patch`.
    pub fn parsed_version(&self) -> Option<(u32, u32, u32)> {
        parse_version(self.version.as_deref()?)
    }

    /// Fails if the detected version predates HNSW. Unknown versions pass.
    pub fn require_hnsw(&self) -> Result<()> {
        match self.parsed_version() {
            Some(v) if v < HNSW_MIN_VERSION => Err(Error::ExtensionUnavailable(format!(
                "HNSW indexes require pgvector {}.{}.{} or newer, found {}",
                HNSW_MIN_VERSION.0,
                HNSW_MIN_VERSION.1,
                HNSW_MIN_VERSION.2,
                self.version.as_deref().unwrap_or_default()
            ))),
            _ => Ok(()),
        }
    }

    /// How to spell the vector type from tables in `table_schema`.
    pub fn type_ref(&self, table_schema: &str) -> VectorTypeRef {
        VectorTypeRef::for_schemas(self.schema.as_deref(), table_schema)
    }
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.').map(|p| p.trim().parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(|p| p.ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.ok()).unwrap_or(0);
    Some((major, minor, patch))
}

/// Spelling of the vector type, its operators and operator classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorTypeRef {
    /// Set only when qualification is required.
    schema: Option<String>,
}

impl VectorTypeRef {
    /// Unqualified names, resolved through `search_path`.
    pub fn unqualified() -> Self {
        Self::default()
    }

    /// Qualifies with `extension_schema` when it differs from `table_schema`.
    pub fn for_schemas(extension_schema: Option<&str>, table_schema: &str) -> Self {
        match extension_schema {
            Some(ext) if ext != table_schema => Self {
                schema: Some(ext.to_string()),
            },
            _ => Self::unqualified(),
        }
    }

    /// Returns the qualifying schema, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// `vector` or `"ext".vector`.
    pub fn type_name(&self) -> String {
        self.qualify(EXTENSION_NAME)
    }

    /// `vector(3)` or `"ext".vector(3)`.
    pub fn column_type(&self, dimension: u32) -> String {
        format!("{}({dimension})", self.type_name())
    }

    /// Casts a placeholder to the vector type: `$1::vector`.
    pub fn cast(&self, placeholder: &str) -> String {
        format!("{placeholder}::{}", self.type_name())
    }

    /// The metric's distance between `column` and `rhs`, parenthesized.
    pub fn distance(&self, metric: DistanceMetric, column: &str, rhs: &str) -> String {
        match &self.schema {
            Some(schema) => format!(
                "({column} OPERATOR({}.{}) {rhs})",
                quote(schema),
                metric.operator()
            ),
            None => format!("({column} {} {rhs})", metric.operator()),
        }
    }

    /// Operator class for ANN indexes on the metric.
    pub fn ops_class(&self, metric: DistanceMetric) -> String {
        self.qualify(metric.ops_class())
    }

    fn qualify(&self, name: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{name}", quote(schema)),
            None => name.to_string(),
        }
    }
}

/// Installs the extension on demand and remembers where it lives.
///
/// The result is cached for the life of the store, including "not installed"
/// after a failed install. Detection errors are not cached, so the next call
/// tries again.
#[derive(Debug, Default)]
pub struct ExtensionManager {
    state: RwLock<Option<ExtensionInfo>>,
    install: AsyncMutex<()>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached state, if any.
    pub fn cached(&self) -> Option<ExtensionInfo> {
        self.state.read().clone()
    }

    /// Makes sure the extension is available, installing it if needed.
    ///
    /// An install failure (typically a missing privilege) is logged and the
    /// returned info reports nothing detected: the type may still resolve if
    /// the extension is available globally.
    pub async fn ensure(&self, pool: &PgPool) -> Result<ExtensionInfo> {
        if let Some(info) = self.cached() {
            return Ok(info);
        }

        let _guard = self.install.lock().await;
        if let Some(info) = self.cached() {
            return Ok(info);
        }

        if let Some(info) = detect(pool).await? {
            debug!(version = ?info.version, schema = ?info.schema, "vector extension detected");
            *self.state.write() = Some(info.clone());
            return Ok(info);
        }

        match sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
        {
            Ok(_) => info!("installed vector extension"),
            Err(e) => warn!(
                error = %e,
                "could not install vector extension; continuing in case it is available globally"
            ),
        }

        let detected = detect(pool).await?;
        Ok(self.record(detected))
    }

    /// Caches the outcome of an install attempt.
    fn record(&self, detected: Option<ExtensionInfo>) -> ExtensionInfo {
        let info = detected.unwrap_or_default();
        if !info.is_detected() {
            debug!("vector extension not installed; using unqualified type names");
        }
        *self.state.write() = Some(info.clone());
        info
    }
}

/// Looks the extension up in `pg_extension`.
pub async fn detect(pool: &PgPool) -> Result<Option<ExtensionInfo>> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT e.extversion::text, n.nspname::text \
         FROM pg_extension e JOIN pg_namespace n ON n.oid = e.extnamespace \
         WHERE e.extname = $1",
    )
    .bind(EXTENSION_NAME)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(version, schema)| ExtensionInfo {
        version: Some(version),
        schema: Some(schema),
    }))
}
