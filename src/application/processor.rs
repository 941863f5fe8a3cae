use crate::domain::UploadEvent;
use crate::ports::processor::{EventProcessor, ProcessError, ProcessOutcome};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Checks that the file an event points at is on disk. Stands in for the
/// real video pipeline, which would pick the file up from here.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCheckProcessor;

#[async_trait]
impl EventProcessor for FileCheckProcessor {
    async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, ProcessError> {
        let path = PathBuf::from(&event.file_path);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                info!(video_id = %event.video_id, path = %path.display(), "file exists, ready for processing");
                Ok(ProcessOutcome::Ready(path))
            }
            Ok(false) => Err(ProcessError::FileMissing(path)),
            Err(e) => Err(ProcessError::Failed(format!(
                "cannot inspect {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
