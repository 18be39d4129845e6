//! Error types for PTZ operations.

use thiserror::Error;

/// Result type for PTZ operations.
pub type PtzResult<T> = Result<T, PtzError>;

/// Errors from PTZ control, calibration, and targeting.
#[derive(Debug, Error)]
pub enum PtzError {
    #[error("PTZ driver error: {0}")]
    Driver(String),

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("Camera {0} is not a PTZ")]
    NotPtz(String),

    #[error("Camera {0} not found")]
    CameraNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] revid_store::StoreError),

    #[error("Interpolation failed: {0}")]
    Interpolation(String),

    #[error("Internal PTZ error: {0}")]
    Internal(String),
}

impl PtzError {
    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }
}
