//! HTTP gateway.
//!
//! Routes uploads to the compression engine:
//! - `POST /api/compress/image` (field `files`)
//! - `POST /api/compress/pdf` (field `file`)
//! - `POST /api/convert/jpg-to-pdf` (field `files`)
//! - health probes under `/api`

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::assembler::PdfAssembler;
use crate::compressor::AdaptiveImageCompressor;
use crate::config::ServiceConfig;
use crate::error::CompressError;
use crate::pdf::PdfPageRewriter;
use crate::scratch::ScopedUpload;

pub mod compression;
pub mod conversion;
pub mod upload;

/// Application state
pub struct AppState {
    pub images: AdaptiveImageCompressor,
    pub pdfs: PdfPageRewriter,
    pub assembler: PdfAssembler,
    pub scratch_dir: PathBuf,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            images: AdaptiveImageCompressor::new(),
            pdfs: PdfPageRewriter::new(config.temp_dir.clone()),
            assembler: PdfAssembler::new(),
            scratch_dir: config.scratch_dir(),
        }
    }
}

/// Errors returned to HTTP clients as JSON.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{error}: {message}")]
    Rejected {
        error: &'static str,
        message: &'static str,
    },

    #[error("{0}")]
    Compression(String),

    #[error("Conversion failed: {message}")]
    Conversion { message: String },

    #[error("No valid images: {message}")]
    NoValidImages { message: String },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Rejected { .. } | ApiError::NoValidImages { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Compression(_) | ApiError::Conversion { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(self) -> ErrorBody {
        match self {
            ApiError::BadRequest(error) | ApiError::Compression(error) => ErrorBody {
                error,
                message: None,
            },
            ApiError::Rejected { error, message } => ErrorBody {
                error: error.to_string(),
                message: Some(message.to_string()),
            },
            ApiError::Conversion { message } => ErrorBody {
                error: "Conversion failed".to_string(),
                message: Some(message),
            },
            ApiError::NoValidImages { message } => ErrorBody {
                error: "No valid images".to_string(),
                message: Some(message),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Rejected request");
        }

        (status, Json(self.body())).into_response()
    }
}

impl From<CompressError> for ApiError {
    fn from(e: CompressError) -> Self {
        if e.is_bad_input() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Compression(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Compression(format!("Worker task failed: {}", e))
    }
}

/// Run a CPU-bound engine call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(
    state: &Arc<AppState>,
    job: F,
) -> Result<Result<T, CompressError>, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, CompressError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    Ok(tokio::task::spawn_blocking(move || job(&state)).await?)
}

/// Build the router
pub fn router(config: &ServiceConfig) -> Router {
    let state = Arc::new(AppState::new(config));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/compress/image",
            post(compression::compress_image_handler),
        )
        .route("/compress/pdf", post(compression::compress_pdf_handler))
        .route(
            "/convert/jpg-to-pdf",
            post(conversion::jpg_to_pdf_handler).options(conversion::preflight_handler),
        )
        .route("/health", get(health_handler))
        .route("/db-health", get(health_handler))
        .route("/file-service-health", get(file_service_health_handler));

    Router::new()
        .route("/", get(root_handler))
        .nest("/api", api_routes)
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "message": "Yukomp API is running",
        "endpoints": {
            "image_compression": "/api/compress/image",
            "pdf_compression": "/api/compress/pdf",
            "jpg_to_pdf": "/api/convert/jpg-to-pdf",
        }
    }))
}

async fn not_found_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": "The requested URL was not found on the server",
        })),
    )
}

// === Health ===

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Healthy when a scratch file can be created and removed.
async fn file_service_health_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let dir = state.scratch_dir.clone();
    let probe = tokio::task::spawn_blocking(move || {
        ScopedUpload::write(b"", Some(dir.as_path()), ".probe").map(drop)
    })
    .await;

    match probe {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Ok(Err(e)) => unhealthy(e.to_string()),
        Err(e) => unhealthy(e.to_string()),
    }
}

fn unhealthy(error: String) -> (StatusCode, Json<serde_json::Value>) {
    warn!(%error, "File service unhealthy");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unhealthy", "error": error })),
    )
}
