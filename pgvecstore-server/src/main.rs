use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pgvecstore_core::{
    CreateIndexParams, DistanceMetric, Error, Filter, IndexConfig, QueryParams, StoreConfig,
    UpsertParams, VectorStore, VectorUpdate,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

/// Settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
struct ServerConfig {
    database_url: String,
    schema: String,
    max_connections: u32,
    addr: SocketAddr,
}

impl ServerConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_ADDR: &'static str = "0.0.0.0:8080";

    fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, String> {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL must be set")?;
        let schema = lookup("PGVECSTORE_SCHEMA").unwrap_or_else(|| "public".to_string());
        let max_connections = match lookup("PGVECSTORE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("PGVECSTORE_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => Self::DEFAULT_MAX_CONNECTIONS,
        };
        let addr_raw = lookup("PGVECSTORE_ADDR").unwrap_or_else(|| Self::DEFAULT_ADDR.to_string());
        let addr = addr_raw
            .parse()
            .map_err(|_| format!("PGVECSTORE_ADDR is not a socket address: {addr_raw}"))?;
        Ok(Self {
            database_url,
            schema,
            max_connections,
            addr,
        })
    }
}

#[derive(Clone)]
struct AppState {
    store: VectorStore,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    let store = VectorStore::new(pool, StoreConfig::new().with_schema(config.schema.clone()))?;

    let app = router(AppState {
        store: store.clone(),
    });

    tracing::info!("listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    store.disconnect().await;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/indexes", get(list_indexes).post(create_index))
        .route("/indexes/:name", get(describe_index).delete(delete_index))
        .route("/indexes/:name/build", post(build_index))
        .route("/indexes/:name/truncate", post(truncate_index))
        .route("/indexes/:name/upsert", post(upsert))
        .route("/indexes/:name/query", post(query))
        .route("/indexes/:name/tuning", post(inspect_tuning))
        .route("/indexes/:name/delete", post(delete_by_filter))
        .route(
            "/indexes/:name/vectors/:id",
            axum::routing::patch(update_vector).delete(delete_vector),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Store errors rendered as `{"error": ...}` with a matching status.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        Error::IndexConflict(_) => StatusCode::CONFLICT,
        Error::Permission(_) => StatusCode::FORBIDDEN,
        Error::ExtensionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_indexes(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let indexes = state.store.list_indexes().await?;
    Ok(Json(json!({ "indexes": indexes })))
}

async fn create_index(
    State(state): State<AppState>,
    Json(params): Json<CreateIndexParams>,
) -> ApiResult<impl IntoResponse> {
    let name = params.name.clone();
    state.store.create_index(params).await?;
    Ok((StatusCode::CREATED, Json(json!({ "name": name }))))
}

async fn describe_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.describe_index(&name).await?))
}

async fn delete_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_index(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct BuildRequest {
    #[serde(default)]
    metric: DistanceMetric,
    #[serde(default, alias = "index_config")]
    config: IndexConfig,
}

async fn build_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BuildRequest>,
) -> ApiResult<impl IntoResponse> {
    state.store.build_index(&name, req.metric, req.config).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn truncate_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.truncate_index(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upsert(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<UpsertParams>,
) -> ApiResult<impl IntoResponse> {
    let ids = state.store.upsert(&name, params).await?;
    Ok(Json(json!({ "ids": ids })))
}

async fn query(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<QueryParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.query(&name, params).await?))
}

async fn inspect_tuning(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<QueryParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.inspect_search_tuning(&name, &params).await?))
}

#[derive(Deserialize)]
struct DeleteByFilterRequest {
    filter: Filter,
}

async fn delete_by_filter(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeleteByFilterRequest>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.store.delete_vectors_by_filter(&name, &req.filter).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn update_vector(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(update): Json<VectorUpdate>,
) -> ApiResult<impl IntoResponse> {
    state.store.update_vector(&name, &id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_vector(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.store.delete_vector(&name, &id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn lazy_state() -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        AppState {
            store: VectorStore::new(pool, StoreConfig::new().with_warmup(false)).unwrap(),
        }
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://db/vectors"),
            ("PGVECSTORE_MAX_CONNECTIONS", "4"),
        ]
        .into_iter()
        .collect();
        let config = ServerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database_url, "postgres://db/vectors");
        assert_eq!(config.schema, "public");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.addr, "0.0.0.0:8080".parse().unwrap());

        assert!(ServerConfig::from_lookup(|_| None).is_err());
        assert!(ServerConfig::from_lookup(|k| match k {
            "DATABASE_URL" => Some("postgres://db".into()),
            "PGVECSTORE_ADDR" => Some("nowhere".into()),
            _ => None,
        })
        .is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::IndexNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::EmptyNot), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::DimensionMismatch {
                index: "x".into(),
                expected: 3,
                actual: 2
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::IndexConflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::Permission("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&Error::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_invalid_name_is_bad_request() {
        let app = router(lazy_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/indexes/bad-name/query")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query_vector": [1.0, 0.0]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].as_str().unwrap().contains("bad-name"));
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(lazy_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
