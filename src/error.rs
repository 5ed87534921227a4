use std::time::Duration;

use thiserror::Error;

/// Terminal failures of a single submission. None of them ever carries a partial count.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Detection failed: {0}")]
    DetectionFailure(String),
    #[error("Detection timed out after {0:?}")]
    DetectionTimeout(Duration),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Commit failed: {0}")]
    Commit(#[source] anyhow::Error),
}

impl PipelineError {
    /// Timeouts and backend faults look the same to callers.
    pub fn is_detection_error(&self) -> bool {
        matches!(
            self,
            PipelineError::DetectionFailure(_) | PipelineError::DetectionTimeout(_)
        )
    }
}
