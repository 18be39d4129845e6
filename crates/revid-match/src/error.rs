//! Error types for grouping and matching.

use thiserror::Error;

/// Result type for matching operations.
pub type MatchResult<T> = Result<T, MatchError>;

/// Errors from the grouping and matching layers.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Store error: {0}")]
    Store(#[from] revid_store::StoreError),

    #[error("No topology between {camera_a} and {camera_b}")]
    NoTopology { camera_a: String, camera_b: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal matching error: {0}")]
    Internal(String),
}

impl MatchError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
