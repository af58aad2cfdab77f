//! HTTP surface.
//!
//! - `GET /`: upload form.
//! - `POST /upload`: multipart field `file`; runs the full pipeline and
//!   returns the summary, matched departments and the dispatch id.
//! - `GET /dispatches`: most recent dispatches.
//! - `GET /dispatches/:id`: per-recipient delivery status.
//! - `GET /health`: liveness.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::email::{DispatchRecord, NotifyError};
use crate::error::StorageError;
use crate::pipeline::{CircularPipeline, PipelineError, PipelineOutcome};

const UPLOAD_FIELD: &str = "file";
const RECENT_DISPATCHES: usize = 20;
const INDEX_HTML: &str = include_str!("../templates/index.html");

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CircularPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<CircularPipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/dispatches", get(list_dispatches))
        .route("/dispatches/:id", get(get_dispatch))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PipelineOutcome>, AppError> {
    let (filename, bytes) = read_upload_field(&mut multipart).await?;

    let outcome = state.pipeline.run(&filename, Arc::new(bytes)).await?;
    tracing::info!(
        departments = ?outcome.departments,
        queued = outcome.queued,
        dispatch = %outcome.dispatch_id,
        "Upload processed"
    );
    Ok(Json(outcome))
}

async fn list_dispatches(State(state): State<AppState>) -> Json<Vec<DispatchRecord>> {
    Json(state.pipeline.notifier().recent(RECENT_DISPATCHES))
}

async fn get_dispatch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchRecord>, AppError> {
    state
        .pipeline
        .notifier()
        .status(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Unknown dispatch {}", id)))
}

/// Returns the filename and bytes of the first `file` field.
async fn read_upload_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no filename".to_string()))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

        return Ok((filename, bytes.to_vec()));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Unavailable(m) | Self::Internal(m) => m,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self.message());
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self.message());
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Storage(StorageError::InvalidFilename(_)) => {
                Self::BadRequest(err.to_string())
            }
            PipelineError::Notify(NotifyError::QueueClosed) => Self::Unavailable(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
