//! Detection predictions awaiting (or past) human review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::{GroupId, PredictionId, TrackId, VideoId};

/// What kind of prediction this row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    /// A single frame with a bounding box
    Keyframe,
    /// A time span without per-frame localization
    TimeRange,
}

/// Review lifecycle of a prediction.
///
/// Predictions enter as `Processing`, get routed to `Pending` /
/// `AutoApproved` / `AutoRejected`, and terminate at `Approved` / `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Processing,
    Pending,
    Approved,
    Rejected,
    AutoApproved,
    AutoRejected,
    NeedsReclassification,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Processing => "processing",
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::AutoApproved => "auto_approved",
            ReviewStatus::AutoRejected => "auto_rejected",
            ReviewStatus::NeedsReclassification => "needs_reclassification",
        }
    }

    /// Terminal states require no further review.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected)
    }

    /// States that count as an approval for downstream consumers.
    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::AutoApproved)
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Class tags attached to a prediction, either by the model or a reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionTags {
    /// Coarse class name ("car", "person", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Fine vehicle subtype ("pickup truck", "SUV", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_subtype: Option<String>,
    /// Who set this tag ("studio_user", "cross_camera_propagation", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_by: Option<String>,
    /// Producer hint ("clip_analysis", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A single detection prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub video_id: VideoId,
    pub model_name: String,
    pub model_version: String,
    /// Scenario namespace, e.g. "vehicle_detection"
    pub scenario: String,
    pub prediction_type: PredictionType,
    pub confidence: f32,
    /// Epoch seconds of the keyframe (or range start). Clip-relative offsets
    /// are resolved against the video's start time at ingest.
    pub timestamp: f64,
    /// Range end for `TimeRange` predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<f64>,
    /// Bounding box; required for keyframe predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub predicted_tags: PredictionTags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_tags: Option<PredictionTags>,
    pub review_status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_object_track_id: Option<TrackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_prediction_id: Option<PredictionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Effective vehicle subtype: corrected tags win over predicted tags.
    pub fn vehicle_subtype(&self) -> Option<&str> {
        self.corrected_tags
            .as_ref()
            .and_then(|t| t.vehicle_subtype.as_deref())
            .or(self.predicted_tags.vehicle_subtype.as_deref())
    }

    /// Keyframe predictions must carry a box with positive dimensions.
    pub fn validate(&self) -> Result<(), String> {
        if self.prediction_type == PredictionType::Keyframe {
            match self.bbox {
                Some(b) if b.is_valid() => Ok(()),
                Some(_) => Err("keyframe prediction bbox must have positive dimensions".into()),
                None => Err("keyframe prediction requires a bbox".into()),
            }
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyframe(bbox: Option<BoundingBox>) -> Prediction {
        Prediction {
            id: 1,
            video_id: 1,
            model_name: "det".into(),
            model_version: "1.0".into(),
            scenario: "vehicle_detection".into(),
            prediction_type: PredictionType::Keyframe,
            confidence: 0.9,
            timestamp: 1.0,
            end_timestamp: None,
            bbox,
            predicted_tags: PredictionTags::default(),
            corrected_tags: None,
            review_status: ReviewStatus::Processing,
            prediction_group_id: None,
            camera_object_track_id: None,
            parent_prediction_id: None,
            reviewed_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_keyframe_requires_valid_bbox() {
        assert!(keyframe(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0))).validate().is_ok());
        assert!(keyframe(Some(BoundingBox::new(0.0, 0.0, 0.0, 10.0))).validate().is_err());
        assert!(keyframe(None).validate().is_err());
    }

    #[test]
    fn test_corrected_subtype_wins() {
        let mut p = keyframe(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        p.predicted_tags.vehicle_subtype = Some("sedan".into());
        assert_eq!(p.vehicle_subtype(), Some("sedan"));
        p.corrected_tags = Some(PredictionTags {
            vehicle_subtype: Some("SUV".into()),
            ..Default::default()
        });
        assert_eq!(p.vehicle_subtype(), Some("SUV"));
    }

    #[test]
    fn test_review_status_serde_snake_case() {
        let json = serde_json::to_string(&ReviewStatus::AutoApproved).unwrap();
        assert_eq!(json, "\"auto_approved\"");
    }
}
