use super::page::{self, Notice};
use super::{upload, AppState, UploadResponder};
use crate::application::{IngestError, IngestReceipt};
use crate::domain::UploadSource;
use axum::{
    extract::State,
    response::Html,
    routing::{get, post},
    Router,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(form))
        .route("/upload-video-gui/", post(upload::<Gui>))
}

/// Browser form. Failures are shown on the page, never as an error status.
pub struct Gui;

impl UploadResponder for Gui {
    type Output = Html<String>;

    const SOURCE: UploadSource = UploadSource::Gui;

    fn accepted(state: &AppState, receipt: IngestReceipt) -> Self::Output {
        Html(page::render(
            state.ingest.validator(),
            Some(Notice::Success {
                video_id: &receipt.event.video_id,
                filename: &receipt.stored.filename,
                published: receipt.published,
            }),
        ))
    }

    fn rejected(state: &AppState, error: IngestError) -> Self::Output {
        Html(page::render(
            state.ingest.validator(),
            Some(Notice::Error(&error.to_string())),
        ))
    }
}

async fn form(State(state): State<AppState>) -> Html<String> {
    Html(page::render(state.ingest.validator(), None))
}
