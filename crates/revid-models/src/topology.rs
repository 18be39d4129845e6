//! Learned inter-camera transit-time distributions.

use serde::{Deserialize, Serialize};

/// Directional transit-time edge between two cameras.
///
/// Absence of an edge means no known route; matchers skip such pairs.
/// The core consumes this table read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub camera_a: String,
    pub camera_b: String,
    pub min_transit_seconds: f64,
    pub max_transit_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_transit_seconds: Option<f64>,
}

impl TopologyEdge {
    /// Average transit, falling back to half the maximum when unlearned.
    pub fn avg_or_default(&self) -> f64 {
        self.avg_transit_seconds
            .unwrap_or(self.max_transit_seconds / 2.0)
    }
}
