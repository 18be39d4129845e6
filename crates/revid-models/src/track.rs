//! Camera object tracks: per-camera aggregates of predictions that likely
//! show the same physical object.

use serde::{Deserialize, Serialize};

use crate::{GroupId, TrackId};

/// Review state of a track's anchor prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    /// Members carry contradictory human reviews
    Conflict,
}

impl AnchorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStatus::Pending => "pending",
            AnchorStatus::Approved => "approved",
            AnchorStatus::Rejected => "rejected",
            AnchorStatus::Conflict => "conflict",
        }
    }

    /// True when the anchor decision can be inherited by new members.
    pub fn is_decided(&self) -> bool {
        matches!(self, AnchorStatus::Approved | AnchorStatus::Rejected)
    }
}

/// Classification carried by a track's anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorClassification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_class: Option<String>,
    /// Who set this classification ("studio_user", "cross_camera_propagation")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_by: Option<String>,
}

/// A per-camera object track built from grouped predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraObjectTrack {
    pub id: TrackId,
    pub camera_id: String,
    pub scenario: String,
    pub member_count: u32,
    pub bbox_centroid_x: f64,
    pub bbox_centroid_y: f64,
    pub avg_bbox_width: f64,
    pub avg_bbox_height: f64,
    pub anchor_status: AnchorStatus,
    #[serde(default)]
    pub anchor_classification: AnchorClassification,
    /// Epoch seconds of the earliest member
    pub first_seen: f64,
    /// Epoch seconds of the latest member
    pub last_seen: f64,
    /// Min track id of this track's identity component, when linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_camera_identity_id: Option<TrackId>,
    /// Set when cross-camera propagation found a disagreeing human label
    #[serde(default)]
    pub cross_camera_conflict: bool,
    /// Group this track was promoted from, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_group_id: Option<GroupId>,
    /// Crop of the anchor prediction, for color descriptors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_crop_path: Option<String>,
    /// Mean L2-normalized appearance embedding over member crops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reid_embedding: Option<Vec<f32>>,
}

impl CameraObjectTrack {
    /// Average member bbox area.
    pub fn avg_area(&self) -> f64 {
        self.avg_bbox_width * self.avg_bbox_height
    }

    /// Observation span in seconds.
    pub fn span_seconds(&self) -> f64 {
        (self.last_seen - self.first_seen).max(0.0)
    }

    /// Vehicle subtype from the anchor classification, if any.
    pub fn vehicle_subtype(&self) -> Option<&str> {
        self.anchor_classification.vehicle_subtype.as_deref()
    }
}
