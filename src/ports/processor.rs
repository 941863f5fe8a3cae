use crate::domain::UploadEvent;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("file not found: {}", .0.display())]
    FileMissing(PathBuf),
    #[error("processing failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The referenced file is on disk and can be picked up
    Ready(PathBuf),
}

/// Work performed by the consumer for every upload event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, ProcessError>;
}
