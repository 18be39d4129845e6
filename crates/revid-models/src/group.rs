//! Prediction groups: spatial-temporal clusters of keyframe predictions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prediction::ReviewStatus;
use crate::{GroupId, PredictionId};

/// Derived cluster of predictions from one camera. Aggregates are recomputed
/// whenever membership changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionGroup {
    pub id: GroupId,
    pub camera_id: String,
    pub scenario: String,
    /// Member with the largest bbox (ties broken by confidence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representative_prediction_id: Option<PredictionId>,
    pub bbox_centroid_x: f64,
    pub bbox_centroid_y: f64,
    pub avg_bbox_width: f64,
    pub avg_bbox_height: f64,
    pub member_count: u32,
    pub min_confidence: f32,
    pub max_confidence: f32,
    pub avg_confidence: f32,
    pub min_timestamp: f64,
    pub max_timestamp: f64,
    pub review_status: ReviewStatus,
    pub updated_at: DateTime<Utc>,
}

impl PredictionGroup {
    /// Average bbox area of the group's members.
    pub fn avg_area(&self) -> f64 {
        self.avg_bbox_width * self.avg_bbox_height
    }

    /// Diagonal of the average bbox, used as the grouping distance scale.
    pub fn avg_diagonal(&self) -> f64 {
        (self.avg_bbox_width * self.avg_bbox_width + self.avg_bbox_height * self.avg_bbox_height)
            .sqrt()
    }
}
