//! Background worker runtime.
//!
//! Pulls jobs from the in-process queue and drives the pipeline crates:
//! clip analysis, prediction grouping, track building, cross-camera
//! matching, identity resolution, training-frame export, and PTZ
//! calibration. Workers never crash the process on a job failure; errors
//! become status entries and structured logs.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod processor;
pub mod retry;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use retry::{retry_with_backoff, RetryConfig};
