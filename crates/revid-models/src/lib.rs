//! Shared data models for the ReVid backend.
//!
//! This crate provides Serde-serializable types for:
//! - Bounding-box and trajectory geometry
//! - Cameras, videos, and detection predictions
//! - Prediction groups and camera object tracks
//! - Video tracks produced by MOT clip tracking
//! - Clip analysis results (consensus classification)
//! - Cross-camera links, topology edges, and crossing lines
//! - PTZ calibration reference points
//! - The vehicle class taxonomy and matcher weight configuration

pub mod analysis;
pub mod calibration;
pub mod camera;
pub mod crossing_line;
pub mod geometry;
pub mod group;
pub mod link;
pub mod matching;
pub mod motion;
pub mod prediction;
pub mod taxonomy;
pub mod topology;
pub mod track;
pub mod video;
pub mod video_track;

// Re-export common types
pub use analysis::{
    AnalysisStatus, ClipAnalysisResult, ConsensusResult, FrameClassification, FrameQualityScore,
};
pub use calibration::{PtzCalibrationPoint, PtzPosition};
pub use camera::{Camera, PtzSettings};
pub use crossing_line::CrossingLine;
pub use geometry::{mean_bbox, nearest_point, BoundingBox, TrajectoryPoint};
pub use group::PredictionGroup;
pub use link::{CrossCameraLink, LinkStatus, SourceTrackType};
pub use matching::{AnalysisConfig, DirectionWeights, CrossingWeights, MatchWeights};
pub use motion::{
    compute_travel_direction, direction_compatibility, direction_from_path, TrackMotion,
};
pub use prediction::{Prediction, PredictionTags, PredictionType, ReviewStatus};
pub use taxonomy::ClassTaxonomy;
pub use topology::TopologyEdge;
pub use track::{AnchorClassification, AnchorStatus, CameraObjectTrack};
pub use video::{PathSample, Video, VideoMetadata};
pub use video_track::{TravelDirection, VideoTrack, VideoTrackStatus};

/// Monotonic row id for videos.
pub type VideoId = i64;
/// Monotonic row id for predictions.
pub type PredictionId = i64;
/// Monotonic row id for prediction groups.
pub type GroupId = i64;
/// Monotonic row id for camera object tracks.
pub type TrackId = i64;
/// Monotonic row id for video tracks.
pub type VideoTrackId = i64;
/// Monotonic row id for clip analysis results.
pub type AnalysisId = i64;
/// Monotonic row id for cross-camera links.
pub type LinkId = i64;
/// Monotonic row id for crossing lines.
pub type CrossingLineId = i64;
/// Monotonic row id for PTZ calibration points.
pub type CalibrationPointId = i64;
