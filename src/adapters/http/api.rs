use super::{upload, AppState, UploadResponder};
use crate::adapters::fs::StorageError;
use crate::application::{IngestError, IngestReceipt};
use crate::domain::UploadSource;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::error;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(descriptor))
        .route("/health", get(api_health))
        .route("/upload-video/", post(upload::<Api>))
        .route("/uploads/:filename", get(download))
}

pub fn download_url(filename: &str) -> String {
    format!("/api/uploads/{}", filename)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub video_id: String,
    pub filename: String,
    pub file_size: u64,
    /// Existing clients read the publish outcome under this key.
    #[serde(rename = "kafka_sent")]
    pub published: bool,
    pub download_url: String,
}

impl From<IngestReceipt> for UploadResponse {
    fn from(receipt: IngestReceipt) -> Self {
        Self {
            status: "success".to_string(),
            message: "Video uploaded successfully".to_string(),
            video_id: receipt.event.video_id,
            download_url: download_url(&receipt.stored.filename),
            filename: receipt.stored.filename,
            file_size: receipt.stored.size,
            published: receipt.published,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub bus_connected: bool,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match err {
            IngestError::Validation(_) | IngestError::Body(_) => StatusCode::BAD_REQUEST,
            IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub struct Api;

impl UploadResponder for Api {
    type Output = Result<Json<UploadResponse>, ApiError>;

    const SOURCE: UploadSource = UploadSource::Api;

    fn accepted(_: &AppState, receipt: IngestReceipt) -> Self::Output {
        Ok(Json(receipt.into()))
    }

    fn rejected(_: &AppState, error: IngestError) -> Self::Output {
        Err(error.into())
    }
}

async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let opened = state.ingest.storage().open(&filename).await.map_err(|e| match e {
        StorageError::InvalidName(_) => ApiError::new(StatusCode::BAD_REQUEST, "Invalid file name"),
        other => {
            error!(filename = %filename, error = %other, "failed to open stored file");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Download failed")
        }
    })?;
    let Some((file, size)) = opened else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "File not found"));
    };

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// Service summary for clients.
pub async fn descriptor(State(state): State<AppState>) -> Json<Value> {
    let validator = state.ingest.validator();
    Json(json!({
        "service": "Video Upload API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /upload-video/",
            "download": "GET /uploads/{filename}",
            "health": "GET /health"
        },
        "allowed_extensions": validator.allowed_extensions(),
        "max_file_size_gb": validator.max_size_gb(),
        "topic": state.ingest.publisher().topic(),
    }))
}

async fn health(state: &AppState, service: &str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: service.to_string(),
        bus_connected: state.ingest.publisher().is_connected().await,
    })
}

async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    health(&state, "video-upload-api").await
}

pub async fn server_health(State(state): State<AppState>) -> Json<HealthResponse> {
    health(&state, "video-upload-server").await
}
