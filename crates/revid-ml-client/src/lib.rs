//! Clients for the model-inference sidecars.
//!
//! The core never runs models in-process. Object detection and ReID
//! embedding are remote HTTP services behind the [`ObjectDetector`] and
//! [`ReidEmbedder`] traits; this crate provides the production clients with
//! per-call timeouts and retry.

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpDetector, HttpEmbedder, MlClientConfig};
pub use error::{MlClientError, MlClientResult};
pub use types::{Detection, ObjectDetector, ReidEmbedder};
