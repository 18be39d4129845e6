//! Video records and upstream metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::VideoId;

/// One sample of the upstream detector's object path: normalized centroid
/// plus an epoch timestamp. Coordinates are in [0, 1] frame space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathSample {
    /// Normalized centroid x (0 = left edge)
    pub cx: f64,
    /// Normalized centroid y (0 = top edge)
    pub cy: f64,
    /// Epoch seconds
    pub timestamp: f64,
}

/// Metadata attached to a video at ingest. The body of a video is immutable;
/// metadata may be augmented later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Event id from the upstream NVR, when the clip came from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    /// Object path reported by the upstream detector, normalized coords
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_data: Option<Vec<PathSample>>,
}

impl VideoMetadata {
    /// Timestamps bracketing the path: (start, mid, end) epoch seconds.
    ///
    /// The midpoint is sub-second accurate and far more reliable than
    /// first_seen/last_seen, which are often the same rounded value for a
    /// whole ingest batch.
    pub fn path_times(&self) -> Option<(f64, f64, f64)> {
        let path = self.path_data.as_ref()?;
        let first = path.first()?;
        let last = path.last()?;
        let mid = (first.timestamp + last.timestamp) / 2.0;
        Some((first.timestamp, mid, last.timestamp))
    }
}

/// A stored video clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub camera_id: String,
    pub filename: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    #[serde(default)]
    pub metadata: VideoMetadata,
    pub created_at: DateTime<Utc>,
}
