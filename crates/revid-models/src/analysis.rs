//! Clip analysis results: weighted consensus classification per video track.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::prediction::ReviewStatus;
use crate::video_track::TravelDirection;
use crate::{AnalysisId, VideoId, VideoTrackId};

/// One classified frame matched to a track by IoU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameClassification {
    /// Seconds from clip start
    pub timestamp: f64,
    pub class_name: String,
    pub confidence: f32,
    /// Pixel area of the matched detection
    pub bbox_area: f64,
    /// Center of the matched detection, for the quality center score
    pub bbox_cx: f64,
    pub bbox_cy: f64,
}

/// Per-frame crop quality, used to pick training frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameQualityScore {
    pub timestamp: f64,
    /// Product of area, confidence, class-match, and center factors, in [0, 1]
    pub quality_score: f64,
    pub bbox_area: f64,
    pub confidence: f32,
}

/// Output of the weighted consensus vote over a track's frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_class: String,
    /// Winning class weight over total weight, in [0, 1]
    pub consensus_confidence: f64,
    /// Normalized weight per class; sums to 1
    pub class_distribution: HashMap<String, f64>,
}

/// Processing status of a clip analysis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Completed,
    Failed,
}

/// Stored result of analyzing one video track in one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipAnalysisResult {
    pub id: AnalysisId,
    pub video_id: VideoId,
    pub video_track_id: VideoTrackId,
    pub camera_id: String,
    pub consensus_class: String,
    pub consensus_confidence: f64,
    pub class_distribution: HashMap<String, f64>,
    pub frame_classifications: Vec<FrameClassification>,
    pub frame_quality_scores: Vec<FrameQualityScore>,
    /// Number of classified frames contributing to the consensus
    pub total_frames: u32,
    /// Clip duration in seconds
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_of_travel: Option<TravelDirection>,
    pub status: AnalysisStatus,
    pub review_status: ReviewStatus,
    /// Reviewer-supplied replacement bbox, when the track bbox was wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_bbox: Option<BoundingBox>,
    /// Why the reviewer flagged this result, if they did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_reason: Option<String>,
    /// Number of frames exported for training from this analysis
    #[serde(default)]
    pub training_frames_exported: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
