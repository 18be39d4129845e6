//! Clip analysis engine.
//!
//! Given a short video clip this crate runs multi-object tracking, cleans
//! tracker artifacts (duplicate tracks, fragmentation, trajectory jumps),
//! classifies each surviving track by weighted frame-level consensus, and
//! persists per-track classification records.

pub mod classify;
pub mod driver;
pub mod engine;
pub mod error;
pub mod export;
pub mod postprocess;
pub mod tracker;

pub use classify::{compute_weighted_consensus, score_frame_quality};
pub use driver::{MotDriver, MotDriverConfig};
pub use engine::{ClipAnalysisEngine, ClipSource, ResolvedClip};
pub use error::{AnalysisError, AnalysisResult};
pub use export::{export_training_frames, ExportSummary};
pub use postprocess::{clean_trajectory_jumps, merge_overlapping_tracks, stitch_sequential_tracks};
pub use tracker::{ByteTracker, ByteTrackerConfig, TrackerDetection};
