// Hire Ingest - Web Server
// Thin HTTP caller of the load pipeline: every request runs one load on a
// blocking worker with its own database connection and relays the summary.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hire_ingest::logging::{init_logging, LogConfig};
use hire_ingest::{
    load_chunked, load_everything, open_database, ChunkedSummary, EntityKind, IngestConfig,
    IngestError, LoadSummary,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinError;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<IngestConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Raw query text, so malformed sizes get the same 422 as out-of-range ones
#[derive(Debug, Deserialize)]
struct BatchParams {
    chunk_size: Option<String>,
}

impl BatchParams {
    fn chunk_size(&self) -> hire_ingest::Result<Option<usize>> {
        self.chunk_size
            .as_deref()
            .map(|raw| {
                raw.trim().parse::<usize>().map_err(|_| {
                    IngestError::Config(format!(
                        "chunk_size must be a positive integer, got {:?}",
                        raw
                    ))
                })
            })
            .transpose()
    }
}

fn status_for(err: &IngestError) -> StatusCode {
    match err {
        IngestError::Config(_) | IngestError::InvalidChunkSize(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<hire_ingest::Result<T>, JoinError>) -> Response {
    match result {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Load failed");
            (status_for(&e), Json(ApiResponse::<T>::fail(e.to_string()))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Load worker did not finish");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<T>::fail("load worker failed".to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Hello API" }))
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /upload-data - Load all three source files, one transaction each
async fn upload_data(State(state): State<AppState>) -> Response {
    let config = state.config.clone();

    let result = tokio::task::spawn_blocking(move || -> hire_ingest::Result<Vec<LoadSummary>> {
        let mut conn = open_database(&config.database_path)?;
        let mut sink = config.error_sink();
        load_everything(&mut conn, &mut sink, &config.data_dir)
    })
    .await;

    respond(result)
}

/// POST /employees/batch-from-csv?chunk_size=N - Chunked employee load
async fn batch_from_csv(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
) -> Response {
    let options = match params
        .chunk_size()
        .and_then(|size| state.config.chunk_options(size))
    {
        Ok(options) => options,
        Err(e) => {
            return (status_for(&e), Json(ApiResponse::<()>::fail(e.to_string()))).into_response()
        }
    };

    let config = state.config.clone();
    let result = tokio::task::spawn_blocking(move || -> hire_ingest::Result<ChunkedSummary> {
        let mut conn = open_database(&config.database_path)?;
        let mut sink = config.error_sink();
        load_chunked(
            &mut conn,
            &mut sink,
            &config.source_path(EntityKind::Employee),
            EntityKind::Employee,
            options,
        )
    })
    .await;

    respond(result)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_config = LogConfig::default().merge_env()?;
    init_logging(&log_config)?;

    let config = IngestConfig::from_env()?;

    // Create tables up front so the first request does not race on it
    open_database(&config.database_path)?;

    let addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
    };

    let api_routes = Router::new().route("/health", get(health_check));

    let app = Router::new()
        .route("/", get(root))
        .route("/upload-data", post(upload_data))
        .route("/employees/batch-from-csv", post(batch_from_csv))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Server running");

    axum::serve(listener, app).await?;

    Ok(())
}
