//! HTTP inbound adapter.
//!
//! The JSON API is mounted under `/api`, the HTML upload form at the root.
//! Both upload endpoints run the same handler, [`upload`], and differ only in
//! the [`UploadResponder`] that turns the outcome into a response.

pub mod api;
pub mod gui;
mod page;


use crate::application::{IngestError, IngestReceipt, IngestService};
use crate::domain::{UploadSource, ValidationError};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
}

impl AppState {
    pub fn new(ingest: IngestService) -> Self {
        Self {
            ingest: Arc::new(ingest),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::server_health))
        // Nesting only serves the inner "/" at "/api".
        .route("/api/", get(api::descriptor))
        .nest("/api", api::routes())
        .merge(gui::routes())
        // Size is enforced while the body streams to disk.
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Output format of an upload endpoint.
pub trait UploadResponder {
    type Output: IntoResponse;

    const SOURCE: UploadSource;

    fn accepted(state: &AppState, receipt: IngestReceipt) -> Self::Output;

    fn rejected(state: &AppState, error: IngestError) -> Self::Output;
}

pub async fn upload<R: UploadResponder>(
    State(state): State<AppState>,
    multipart: Multipart,
) -> R::Output {
    match receive(&state, multipart, R::SOURCE).await {
        Ok(receipt) => R::accepted(&state, receipt),
        Err(error) => R::rejected(&state, error),
    }
}

/// Ingest the first part of the form that carries a file name.
async fn receive(
    state: &AppState,
    mut multipart: Multipart,
    source: UploadSource,
) -> Result<IngestReceipt, IngestError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestError::Body(e.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if filename.is_empty() {
            // Browsers send an empty file part when nothing was picked.
            break;
        }
        return state.ingest.ingest(&filename, field, source).await;
    }
    Err(ValidationError::MissingFile.into())
}
