//! Error types for ML service clients.

use thiserror::Error;

/// Result type for ML client operations.
pub type MlClientResult<T> = Result<T, MlClientError>;

/// Errors from the detection and embedding services.
#[derive(Debug, Error)]
pub enum MlClientError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Service returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl MlClientError {
    /// True when a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MlClientError::Unavailable(_) | MlClientError::Timeout(_) => true,
            MlClientError::BadStatus { status, .. } => *status >= 500,
            MlClientError::Http(e) => e.is_timeout() || e.is_connect(),
            MlClientError::InvalidResponse(_) => false,
        }
    }
}
