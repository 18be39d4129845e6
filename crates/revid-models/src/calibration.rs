//! PTZ calibration reference points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CalibrationPointId;

/// An ONVIF-normalized pan/tilt position. Both axes are in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PtzPosition {
    pub pan: f64,
    pub tilt: f64,
}

impl PtzPosition {
    pub fn new(pan: f64, tilt: f64) -> Self {
        Self { pan, tilt }
    }

    /// Euclidean distance to another position in pan/tilt units.
    pub fn distance(&self, other: &PtzPosition) -> f64 {
        let dp = self.pan - other.pan;
        let dt = self.tilt - other.tilt;
        (dp * dp + dt * dt).sqrt()
    }
}

/// A confirmed mapping from a source-camera bbox position to a PTZ aim.
///
/// `estimated_*` is what the targeting engine predicted; `actual_*` is where
/// the operator (or visual calibration) verified the PTZ should point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzCalibrationPoint {
    pub id: CalibrationPointId,
    pub source_camera_id: String,
    pub target_camera_id: String,
    /// Normalized bbox center on the source camera, [0, 1]
    pub source_bbox_x: f64,
    pub source_bbox_y: f64,
    pub estimated_pan: f64,
    pub estimated_tilt: f64,
    pub actual_pan: f64,
    pub actual_tilt: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}
