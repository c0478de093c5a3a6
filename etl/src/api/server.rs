//! HTTP server for triggering runs.
//!
//! The external scheduler calls `POST /api/runs` once a day. Runs are not
//! coordinated: two overlapping requests run two pipelines, and the
//! conflict-tolerant inserts keep the result correct.
//!
//! # API Endpoints
//!
//! | Method | Path        | Description                    |
//! |--------|-------------|--------------------------------|
//! | GET    | `/health`   | Health check                   |
//! | POST   | `/api/runs` | Run the pipeline once, return the report |
//! | GET    | `/api/logs` | SSE stream for real-time logs  |

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, sse::KeepAlive, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{error_response, RunRequest, RunResponse};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ServerResult};
use crate::load::LoadOptions;
use crate::pipeline::Pipeline;

type ApiError = (StatusCode, Json<Value>);

pub fn router(config: PipelineConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/runs", post(trigger_run))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(config))
}

pub async fn start_server(port: u16, config: PipelineConfig) -> ServerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    eprintln!("🚀 Stockmart ETL listening on http://localhost:{}", port);
    eprintln!("   POST /api/runs - Run the pipeline");
    eprintln!("   GET  /api/logs - SSE log stream");
    eprintln!("   GET  /health   - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(config)).await?;

    Ok(())
}

async fn health(State(config): State<Arc<PipelineConfig>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "stockmart-etl",
        "version": env!("CARGO_PKG_VERSION"),
        "namespace": config.target_namespace,
        "endpoints": {
            "runs": "POST /api/runs",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(LOG_BROADCASTER.subscribe()).filter_map(|result| {
        // Lagged subscribers lose entries rather than the connection.
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn trigger_run(
    State(config): State<Arc<PipelineConfig>>,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    let request: RunRequest = if body.is_empty() {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(error_response(&format!("Invalid request body: {}", e))),
            )
        })?
    };

    let options = LoadOptions {
        atomic: request.atomic.unwrap_or(config.atomic_load),
    };
    let source = config.source().map_err(PipelineError::from).map_err(internal)?;
    let target = config.target().map_err(PipelineError::from).map_err(internal)?;

    let report = Pipeline::new(source, target)
        .with_options(options)
        .run()
        .await
        .map_err(internal)?;

    Ok(Json(RunResponse::from(report)))
}

fn internal(e: PipelineError) -> ApiError {
    log_error(format!("Run request failed: {}", e));
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(error_response(&e.to_string())),
    )
}
