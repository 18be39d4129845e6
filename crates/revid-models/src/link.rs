//! Cross-camera links between tracks believed to show the same vehicle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CrossingLineId, LinkId, TrackId};

/// Link review status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Created by a matcher, awaiting review
    #[default]
    Auto,
    /// Created by a matcher with high enough confidence to skip review
    AutoConfirmed,
    /// Confirmed by a human reviewer
    Confirmed,
    /// Rejected by a human reviewer
    Rejected,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Auto => "auto",
            LinkStatus::AutoConfirmed => "auto_confirmed",
            LinkStatus::Confirmed => "confirmed",
            LinkStatus::Rejected => "rejected",
        }
    }

    /// Reviewed statuses are never overwritten by matcher upserts.
    pub fn is_reviewed(&self) -> bool {
        matches!(self, LinkStatus::Confirmed | LinkStatus::Rejected)
    }
}

/// Which table the linked track ids reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceTrackType {
    #[default]
    CameraObject,
    VideoTrack,
}

/// A link between two tracks on different cameras.
///
/// Invariant: `track_a_id < track_b_id`, and at most one link exists per
/// unordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCameraLink {
    pub id: LinkId,
    pub track_a_id: TrackId,
    pub track_b_id: TrackId,
    /// Entity class being linked, e.g. "vehicle"
    pub entity_type: String,
    pub match_confidence: f64,
    /// Method string, e.g. "direction", "crossing_line", "reid+temporal"
    pub match_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reid_similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_gap_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_match: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossing_line_id: Option<CrossingLineId>,
    pub status: LinkStatus,
    pub source_track_type: SourceTrackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CrossCameraLink {
    /// Normalize a pair so the smaller id comes first.
    pub fn normalize_pair(a: TrackId, b: TrackId) -> (TrackId, TrackId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// True when the link contributes to identity resolution.
    pub fn is_effective(&self) -> bool {
        self.status != LinkStatus::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pair() {
        assert_eq!(CrossCameraLink::normalize_pair(5, 3), (3, 5));
        assert_eq!(CrossCameraLink::normalize_pair(3, 5), (3, 5));
    }

    #[test]
    fn test_reviewed_statuses() {
        assert!(LinkStatus::Confirmed.is_reviewed());
        assert!(LinkStatus::Rejected.is_reviewed());
        assert!(!LinkStatus::Auto.is_reviewed());
        assert!(!LinkStatus::AutoConfirmed.is_reviewed());
    }
}
