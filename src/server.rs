//! HTTP API.
//!
//! Exposes the search engine as a JSON HTTP API for agents and the web
//! front-end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, entry count, index state) |
//! | `POST` | `/search` | Lexical pipeline: `{ "query", "limit"?, "explain"? }` |
//! | `POST` | `/discover` | Semantic-first pipeline, same body |
//! | `POST` | `/workflows/search` | Ranked workflow chains: `{ "query", "limit"? }` |
//! | `GET`  | `/entries/{slug}` | One registry entry |
//!
//! Empty results from `/search` and `/discover` are recorded in the
//! unmet-request log.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clihub_core::models::{CliEntry, ScoredWorkflow, SearchResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::hub::Hub;

/// Upper bound on `limit` accepted from clients.
const MAX_LIMIT: usize = 50;

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let hub = Arc::new(Hub::open(config).await?);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "clihub server listening");
    axum::serve(listener, router(hub)).await?;

    Ok(())
}

/// The application router, exposed for embedding and tests.
pub fn router(hub: Arc<Hub>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/discover", post(handle_discover))
        .route("/workflows/search", post(handle_workflows))
        .route("/entries/{slug}", get(handle_entry))
        .layer(cors)
        .with_state(hub)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Store failures: timeouts map to 408, everything else to 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        if message.contains("timed out") {
            AppError {
                status: StatusCode::REQUEST_TIMEOUT,
                code: "timeout".to_string(),
                message,
            }
        } else {
            tracing::error!(error = %message, "request failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message,
            }
        }
    }
}

// ============ Handlers ============

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    explain: bool,
}

impl SearchBody {
    fn validated(&self, hub: &Hub) -> Result<usize, AppError> {
        if self.query.trim().is_empty() {
            return Err(bad_request("query must not be empty"));
        }
        let limit = self.limit.unwrap_or(hub.config.retrieval.final_limit);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(bad_request(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(limit)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    entries: usize,
    workflows: usize,
    vector_index: bool,
}

async fn handle_health(State(hub): State<Arc<Hub>>) -> Json<HealthResponse> {
    let registry = hub.store.inner();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        entries: registry.entry_count(),
        workflows: registry.workflow_count(),
        vector_index: hub.engine.index_active(),
    })
}

async fn handle_search(
    State(hub): State<Arc<Hub>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let limit = body.validated(&hub)?;
    Ok(Json(hub.search(&body.query, limit, body.explain).await?))
}

async fn handle_discover(
    State(hub): State<Arc<Hub>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let limit = body.validated(&hub)?;
    Ok(Json(hub.discover(&body.query, limit, body.explain).await?))
}

#[derive(Serialize)]
struct WorkflowsResponse {
    results: Vec<ScoredWorkflow>,
}

async fn handle_workflows(
    State(hub): State<Arc<Hub>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<WorkflowsResponse>, AppError> {
    let limit = body.validated(&hub)?;
    let results = hub.engine.search_workflows(&body.query, limit).await?;
    Ok(Json(WorkflowsResponse { results }))
}

async fn handle_entry(
    State(hub): State<Arc<Hub>>,
    Path(slug): Path<String>,
) -> Result<Json<CliEntry>, AppError> {
    match hub.engine.get_entry(&slug).await? {
        Some(entry) => Ok(Json(entry)),
        None => Err(not_found(format!("no entry with slug '{}'", slug))),
    }
}
