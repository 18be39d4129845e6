//! Operator-drawn crossing lines: spatial gates paired across cameras.

use serde::{Deserialize, Serialize};

use crate::CrossingLineId;

/// A line segment on one camera's view representing a physical boundary.
/// Paired lines on two cameras represent the same boundary and must
/// reference each other symmetrically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingLine {
    pub id: CrossingLineId,
    pub camera_id: String,
    pub line_name: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Unit vector pointing in the "forward" crossing direction
    pub forward_dx: f64,
    pub forward_dy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_line_id: Option<CrossingLineId>,
    /// When true, the lane coordinate on this line's pair runs backwards
    #[serde(default)]
    pub lane_mapping_reversed: bool,
}

impl CrossingLine {
    /// Project a point onto the line segment.
    ///
    /// Returns a parameter in [0, 1] (clamped): 0 at (x1, y1), 1 at (x2, y2).
    /// Degenerate zero-length lines project everything to the middle.
    pub fn lane_position(&self, cx: f64, cy: f64) -> f64 {
        let dx = self.x2 - self.x1;
        let dy = self.y2 - self.y1;
        let length_sq = dx * dx + dy * dy;
        if length_sq == 0.0 {
            return 0.5;
        }
        let t = ((cx - self.x1) * dx + (cy - self.y1) * dy) / length_sq;
        t.clamp(0.0, 1.0)
    }

    /// Whether a travel direction aligns with the forward vector.
    ///
    /// Returns `Some(true)` when the dot product is positive, `Some(false)`
    /// when negative, `None` when perpendicular or the direction is unknown.
    pub fn direction_match(&self, direction: Option<(f64, f64)>) -> Option<bool> {
        let (dx, dy) = direction?;
        let dot = dx * self.forward_dx + dy * self.forward_dy;
        if dot.abs() < 1e-6 {
            return None;
        }
        Some(dot > 0.0)
    }

    /// Magnitude of the forward vector; 1 within epsilon for valid lines.
    pub fn forward_magnitude(&self) -> f64 {
        (self.forward_dx * self.forward_dx + self.forward_dy * self.forward_dy).sqrt()
    }
}
