//! Video tracks: MOT output for one clip.

use serde::{Deserialize, Serialize};

use crate::geometry::{mean_bbox, BoundingBox, TrajectoryPoint};
use crate::{TrackId, VideoId, VideoTrackId};

/// Lifecycle of a video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoTrackStatus {
    #[default]
    Active,
    /// Deactivated as a duplicate of an overlapping track
    Merged,
    /// Deactivated because jump cleaning left no usable segment
    JumpFragmented,
}

impl VideoTrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoTrackStatus::Active => "active",
            VideoTrackStatus::Merged => "merged",
            VideoTrackStatus::JumpFragmented => "jump_fragmented",
        }
    }
}

/// Simplified travel direction label in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelDirection {
    LeftToRight,
    RightToLeft,
    /// Moving down the frame, toward the camera
    Approaching,
    /// Moving up the frame, away from the camera
    Departing,
    Stationary,
}

impl TravelDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelDirection::LeftToRight => "left_to_right",
            TravelDirection::RightToLeft => "right_to_left",
            TravelDirection::Approaching => "approaching",
            TravelDirection::Departing => "departing",
            TravelDirection::Stationary => "stationary",
        }
    }
}

impl std::fmt::Display for TravelDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persistent tracker identity over a single clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    pub id: VideoTrackId,
    pub video_id: VideoId,
    pub camera_id: String,
    /// Id assigned by the MOT tracker within the clip
    pub tracker_track_id: u32,
    pub class_name: String,
    /// Per-frame samples, sorted by timestamp
    pub trajectory: Vec<TrajectoryPoint>,
    /// Epoch seconds when first observed (clip start + first sample)
    pub first_seen_epoch: f64,
    /// Epoch seconds when last observed
    pub last_seen_epoch: f64,
    /// Best crop on disk: the frame maximizing area x confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_crop_path: Option<String>,
    pub avg_confidence: f32,
    pub avg_bbox_width: f64,
    pub avg_bbox_height: f64,
    /// L2-normalized appearance embedding of the best crop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reid_embedding: Option<Vec<f32>>,
    pub status: VideoTrackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_camera_identity_id: Option<TrackId>,
}

impl VideoTrack {
    /// Observation span in seconds.
    pub fn span_seconds(&self) -> f64 {
        (self.last_seen_epoch - self.first_seen_epoch).max(0.0)
    }

    /// Average bbox over the trajectory.
    pub fn avg_bbox(&self) -> Option<BoundingBox> {
        mean_bbox(&self.trajectory)
    }

    /// Average bbox area from the stored aggregate columns.
    pub fn avg_area(&self) -> f64 {
        self.avg_bbox_width * self.avg_bbox_height
    }

    /// Recompute the aggregate bbox columns from the trajectory.
    pub fn refresh_aggregates(&mut self) {
        if let Some(avg) = mean_bbox(&self.trajectory) {
            self.avg_bbox_width = avg.w;
            self.avg_bbox_height = avg.h;
        }
        if !self.trajectory.is_empty() {
            let conf_sum: f32 = self.trajectory.iter().map(|p| p.conf).sum();
            self.avg_confidence = conf_sum / self.trajectory.len() as f32;
        }
    }
}
