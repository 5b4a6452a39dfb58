//! JSON HTTP API.
//!
//! Serves the retrieval engine, ingestion trigger, and relocated media over
//! HTTP for browser front ends and scripts.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/search?q=&from=&to=&page=` | One page of matching posts, newest first |
//! | `GET`  | `/trend` | Post counts per month |
//! | `POST` | `/ingest` | Run an ingestion; body `{"archive": "..."}` is optional |
//! | `GET`  | `/media/...` | Files from the permanent media root |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "enter a keyword or a date range to search" } }
//! ```
//!
//! Error codes: `bad_request` (400), `busy` (409, an ingestion is already
//! running), `backend_error` (502).

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use postindex_core::backend::SearchBackend;
use postindex_core::models::MonthBucket;
use postindex_core::paginate::paginate;
use postindex_core::query::{QueryError, SearchRequest};
use postindex_core::search::{posts_per_month, search_posts};

use crate::config::Config;
use crate::elastic::ElasticBackend;
use crate::ingest::{run_ingest, IngestOutcome};
use crate::progress::{CollectingProgress, IngestEvent};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    backend: Arc<dyn SearchBackend>,
    /// Held for the duration of an ingestion run.
    ingest_lock: Arc<Mutex<()>>,
}

/// Build the router over any backend. Used by [`run_server`] and tests.
pub fn router(config: Arc<Config>, backend: Arc<dyn SearchBackend>) -> Router {
    let media_dir = config.paths.media_dir.clone();
    let state = AppState {
        config,
        backend,
        ingest_lock: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search))
        .route("/trend", get(handle_trend))
        .route("/ingest", post(handle_ingest))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` against the configured
/// Elasticsearch backend. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let backend = ElasticBackend::from_config(&config.backend)?;
    let app = router(Arc::new(config.clone()), Arc::new(backend));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP API listening");
    println!("pix listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn busy(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "busy",
        message: message.into(),
    }
}

fn backend_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "backend_error",
        message: message.into(),
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::EmptyRequest
            | QueryError::InvalidDate(_)
            | QueryError::InvertedRange { .. } => bad_request(err.to_string()),
            QueryError::Backend(_) | QueryError::Decode(_) => {
                tracing::warn!(error = %err, "query failed");
                backend_error(err.to_string())
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    from: Option<String>,
    to: Option<String>,
    page: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let request = SearchRequest::parse(
        params.q.as_deref(),
        params.from.as_deref(),
        params.to.as_deref(),
    )?;
    let options = state
        .config
        .retrieval
        .query_options()
        .map_err(|e| bad_request(e.to_string()))?;

    let hits = search_posts(
        state.backend.as_ref(),
        &state.config.backend.index,
        &request,
        &options,
    )
    .await?;
    let page = paginate(
        &hits,
        state.config.retrieval.page_size,
        params.page.unwrap_or(1),
    );
    Ok(Json(page).into_response())
}

// ============ GET /trend ============

async fn handle_trend(State(state): State<AppState>) -> Result<Json<Vec<MonthBucket>>, AppError> {
    let options = state
        .config
        .retrieval
        .query_options()
        .map_err(|e| bad_request(e.to_string()))?;
    let buckets = posts_per_month(state.backend.as_ref(), &state.config.backend.index, &options)
        .await?;
    Ok(Json(buckets))
}

// ============ POST /ingest ============

#[derive(Deserialize, Default)]
struct IngestParams {
    archive: Option<PathBuf>,
}

#[derive(Serialize)]
struct IngestResponse {
    #[serde(flatten)]
    outcome: IngestOutcome,
    events: Vec<IngestEvent>,
}

/// Runs one ingestion and answers with its outcome once it finishes. A
/// failed run is still a `200`; check `success`.
async fn handle_ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let params: IngestParams = if body.iter().all(u8::is_ascii_whitespace) {
        IngestParams::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };

    let Ok(_guard) = state.ingest_lock.try_lock() else {
        return Err(busy("an ingestion run is already in progress"));
    };

    let progress = CollectingProgress::new();
    let outcome = run_ingest(
        &state.config,
        state.backend.as_ref(),
        &progress,
        params.archive.as_deref(),
    )
    .await;

    Ok(Json(IngestResponse {
        outcome,
        events: progress.events(),
    }))
}
