//! Upload pipeline shared by every entry point:
//! validate -> name -> store -> publish.

use crate::adapters::fs::{LocalStorage, StorageError};
use crate::application::publisher::EventPublisher;
use crate::domain::identity::{new_storage_filename, new_video_id};
use crate::domain::{StoredFile, UploadEvent, UploadSource, ValidationError, Validator};
use bytes::Bytes;
use axum::BoxError;
use futures::Stream;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    /// The client sent something we refuse to store
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The request body could not be read as an upload
    #[error("Invalid upload body: {0}")]
    Body(String),
    #[error("Upload failed: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Stream(message) => IngestError::Body(message),
            StorageError::Rejected(err) => IngestError::Validation(err),
            other => IngestError::Storage(other),
        }
    }
}

/// Result of a successful upload. `published` is false when the event could
/// not be delivered; the file is stored either way.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub event: UploadEvent,
    pub stored: StoredFile,
    pub published: bool,
}

pub struct IngestService {
    validator: Validator,
    storage: LocalStorage,
    publisher: EventPublisher,
}

impl IngestService {
    pub fn new(validator: Validator, storage: LocalStorage, publisher: EventPublisher) -> Self {
        Self {
            validator,
            storage,
            publisher,
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Store `body` under a fresh name and announce it.
    ///
    /// The upload is validated before any byte is read, then its size is
    /// re-checked from the body itself after every chunk written; an oversized
    /// body is discarded and reported as a validation failure. The event is
    /// only published once the file is complete on disk.
    pub async fn ingest<S, E>(
        &self,
        original_filename: &str,
        body: S,
        source: UploadSource,
    ) -> Result<IngestReceipt, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        info!(original_filename, %source, "upload request received");

        // Nothing has been received yet.
        let (extension, _) = self.validator.validate(original_filename, 0).map_err(|e| {
            warn!(original_filename, %source, error = %e, "upload rejected");
            e
        })?;
        let filename = new_storage_filename(&extension);

        let stored = match self
            .storage
            .store(body, &filename, &extension, &self.validator)
            .await
        {
            Ok(stored) => stored,
            Err(StorageError::Rejected(e)) => {
                warn!(original_filename, %source, error = %e, "upload rejected");
                return Err(e.into());
            }
            Err(e) => {
                warn!(original_filename, %source, error = %e, "upload not stored");
                return Err(e.into());
            }
        };
        info!(path = %stored.path.display(), size = stored.size, "file saved");

        let event = UploadEvent::new(new_video_id(), original_filename, &stored, source);
        let published = self.publisher.publish(&event).await;
        info!(video_id = %event.video_id, published, "upload completed");

        Ok(IngestReceipt {
            event,
            stored,
            published,
        })
    }
}
