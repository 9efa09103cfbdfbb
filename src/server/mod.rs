//! HTTP surface for subtitle jobs.
//!
//! | Method | Path                      | Response                              |
//! |--------|---------------------------|---------------------------------------|
//! | GET    | `/`                       | `{"status": "…"}`                     |
//! | GET    | `/health`                 | `{"status": "ok", "version": "…"}`    |
//! | POST   | `/api/youtube-subtitles`  | NDJSON [`JobEvent`] feed              |
//! | POST   | `/api/subtitles`          | one JSON result                       |
//!
//! Both POST routes take `{"url": "…"}`. The server keeps no state between
//! requests; every job gets its own scratch directory.

use crate::config::SubtitleConfig;
use crate::error::PipelineError;
use crate::stream::{subtitle_event_stream, JobEvent};
use crate::subtitles::job::{resolve_collection, run_subtitle_job};
use crate::subtitles::platform::VideoPlatform;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Default listening port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8000;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<dyn VideoPlatform>,
    pub config: SubtitleConfig,
}

#[derive(Debug, Deserialize)]
pub struct VideoRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubtitleResponse {
    pub success: bool,
    pub title: String,
    pub text: String,
    pub video_count: usize,
    pub message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Error body for `/api/subtitles`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match e {
            PipelineError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            PipelineError::NoUnits { .. } | PipelineError::NoContent { .. } => {
                StatusCode::NOT_FOUND
            }
            PipelineError::ResolveFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "success": false, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Build the router with permissive CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/youtube-subtitles", post(stream_subtitles))
        .route("/api/subtitles", post(subtitles))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "pagewise subtitle API is running" }))
}

async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// NDJSON feed of [`JobEvent`]s. Validation failures are reported in-band
/// as an `error` event, so the status is always 200.
async fn stream_subtitles(
    State(state): State<AppState>,
    Json(request): Json<VideoRequest>,
) -> Response {
    info!("Streaming subtitle job for {}", request.url);
    let events = subtitle_event_stream(request.url, Arc::clone(&state.platform), state.config);
    let body = Body::from_stream(
        events.map(|event: JobEvent| Ok::<_, Infallible>(event.to_ndjson_line())),
    );
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response()
}

/// Whole job, one JSON answer.
async fn subtitles(
    State(state): State<AppState>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<SubtitleResponse>, ApiError> {
    info!("Subtitle job for {}", request.url);
    let collection = resolve_collection(state.platform.as_ref(), &request.url).await?;
    // Cancellation is per request; a flag in the shared state is not used.
    let config = SubtitleConfig {
        cancel: None,
        ..state.config.clone()
    };
    let output = run_subtitle_job(
        Arc::clone(&state.platform),
        &request.url,
        collection,
        &config,
        None,
        &mut [],
    )
    .await?;

    if !output.has_content() {
        return Err(PipelineError::NoContent {
            source_id: request.url,
        }
        .into());
    }

    Ok(Json(SubtitleResponse {
        success: true,
        message: format!(
            "✨ Completed! Extracted subtitles from {} video(s)",
            output.video_count
        ),
        title: output.title,
        text: output.text,
        video_count: output.video_count,
    }))
}

/// Listening port from `PORT`, or [`DEFAULT_PORT`].
pub fn port_from_env() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Subtitle API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}
