//! Error types for clip analysis.

use thiserror::Error;

/// Result type for clip analysis.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors from the clip analysis engine.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Media error: {0}")]
    Media(#[from] revid_media::MediaError),

    #[error("Model service error: {0}")]
    MlClient(#[from] revid_ml_client::MlClientError),

    #[error("Store error: {0}")]
    Store(#[from] revid_store::StoreError),

    #[error("Clip too corrupted to analyze: {0}")]
    CorruptClip(String),

    #[error("No source resolves to a clip: {0}")]
    ClipNotResolved(String),

    #[error("Clip produced no usable tracks")]
    NoTracks,

    #[error("Internal analysis error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
