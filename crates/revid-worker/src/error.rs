//! Error types for the worker runtime.

use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors from job processing.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Analysis error: {0}")]
    Analysis(#[from] revid_analysis::AnalysisError),

    #[error("Matching error: {0}")]
    Match(#[from] revid_match::MatchError),

    #[error("PTZ error: {0}")]
    Ptz(#[from] revid_ptz::PtzError),

    #[error("Store error: {0}")]
    Store(#[from] revid_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] revid_queue::QueueError),

    #[error("Job failed: {0}")]
    JobFailed(String),
}

impl WorkerError {
    /// Create a job failure error.
    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::JobFailed(message.into())
    }
}
