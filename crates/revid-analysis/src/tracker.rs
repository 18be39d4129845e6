//! ByteTrack-style multi-object tracker.
//!
//! Maintains persistent track IDs across frames using greedy IoU matching
//! with a two-stage association strategy: high-confidence detections first,
//! then low-confidence detections for still-unmatched tracks. Low-confidence
//! detections never start new tracks.

use revid_models::BoundingBox;

/// A detection fed into the tracker for one frame.
#[derive(Debug, Clone)]
pub struct TrackerDetection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// An assignment of a frame detection to a persistent track id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackAssignment {
    /// Persistent tracker id
    pub track_id: u32,
    /// Index into the frame's detection slice
    pub detection_index: usize,
}

#[derive(Debug, Clone)]
struct TrackState {
    id: u32,
    bbox: BoundingBox,
    frames_lost: u32,
}

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct ByteTrackerConfig {
    /// Confidence separating high and low detections
    pub high_threshold: f32,
    /// IoU threshold for matching detections to tracks
    pub match_threshold: f64,
    /// Frames a track may stay unmatched before removal
    pub max_lost: u32,
}

impl Default for ByteTrackerConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.5,
            match_threshold: 0.3,
            max_lost: 30,
        }
    }
}

/// Pure-Rust simplified ByteTrack.
pub struct ByteTracker {
    config: ByteTrackerConfig,
    tracks: Vec<TrackState>,
    next_id: u32,
}

impl ByteTracker {
    /// Create a tracker with the given config.
    pub fn new(config: ByteTrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Process one frame of detections; returns detection-to-track
    /// assignments for this frame.
    pub fn update(&mut self, detections: &[TrackerDetection]) -> Vec<TrackAssignment> {
        let mut high: Vec<usize> = Vec::new();
        let mut low: Vec<usize> = Vec::new();
        for (i, det) in detections.iter().enumerate() {
            if det.score >= self.config.high_threshold {
                high.push(i);
            } else {
                low.push(i);
            }
        }

        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_dets = vec![false; detections.len()];
        let mut assignments = Vec::new();

        // Stage 1: high-confidence detections against all tracks
        for (ti, di) in self.greedy_match(detections, &high, &matched_tracks, &matched_dets) {
            self.tracks[ti].bbox = detections[di].bbox;
            self.tracks[ti].frames_lost = 0;
            matched_tracks[ti] = true;
            matched_dets[di] = true;
            assignments.push(TrackAssignment {
                track_id: self.tracks[ti].id,
                detection_index: di,
            });
        }

        // Stage 2: low-confidence detections against remaining tracks
        for (ti, di) in self.greedy_match(detections, &low, &matched_tracks, &matched_dets) {
            self.tracks[ti].bbox = detections[di].bbox;
            self.tracks[ti].frames_lost = 0;
            matched_tracks[ti] = true;
            matched_dets[di] = true;
            assignments.push(TrackAssignment {
                track_id: self.tracks[ti].id,
                detection_index: di,
            });
        }

        // New tracks for unmatched high-confidence detections
        for &di in &high {
            if !matched_dets[di] {
                let id = self.next_id;
                self.next_id += 1;
                self.tracks.push(TrackState {
                    id,
                    bbox: detections[di].bbox,
                    frames_lost: 0,
                });
                assignments.push(TrackAssignment {
                    track_id: id,
                    detection_index: di,
                });
            }
        }

        // Age unmatched tracks, drop stale ones
        for (ti, matched) in matched_tracks.iter().enumerate() {
            if !matched {
                self.tracks[ti].frames_lost += 1;
            }
        }
        let max_lost = self.config.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        assignments
    }

    /// Greedy IoU matching between unmatched tracks and a subset of
    /// detections. Returns `(track_index, detection_index)` pairs.
    fn greedy_match(
        &self,
        detections: &[TrackerDetection],
        candidate_dets: &[usize],
        matched_tracks: &[bool],
        matched_dets: &[bool],
    ) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            if matched_tracks[ti] {
                continue;
            }
            for &di in candidate_dets {
                if matched_dets[di] {
                    continue;
                }
                let iou = track.bbox.iou(&detections[di].bbox);
                if iou >= self.config.match_threshold {
                    pairs.push((ti, di, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut used_tracks = vec![false; self.tracks.len()];
        let mut used_dets = vec![false; detections.len()];
        let mut matches = Vec::new();
        for (ti, di, _) in pairs {
            if !used_tracks[ti] && !used_dets[di] {
                used_tracks[ti] = true;
                used_dets[di] = true;
                matches.push((ti, di));
            }
        }
        matches
    }

    /// Number of live (not yet dropped) tracks.
    pub fn live_track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f64, y: f64, w: f64, h: f64, score: f32) -> TrackerDetection {
        TrackerDetection {
            bbox: BoundingBox::new(x, y, w, h),
            score,
        }
    }

    fn tracker() -> ByteTracker {
        ByteTracker::new(ByteTrackerConfig {
            high_threshold: 0.5,
            match_threshold: 0.3,
            max_lost: 2,
        })
    }

    #[test]
    fn test_new_detections_get_unique_ids() {
        let mut t = tracker();
        let out = t.update(&[det(0.0, 0.0, 50.0, 50.0, 0.9), det(200.0, 200.0, 50.0, 50.0, 0.8)]);
        assert_eq!(out.len(), 2);
        assert_ne!(out[0].track_id, out[1].track_id);
    }

    #[test]
    fn test_consistent_id_across_frames() {
        let mut t = tracker();
        let first = t.update(&[det(10.0, 10.0, 50.0, 50.0, 0.9)]);
        let id = first[0].track_id;

        let second = t.update(&[det(12.0, 12.0, 50.0, 50.0, 0.9)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].track_id, id);
    }

    #[test]
    fn test_lost_track_removal() {
        let mut t = tracker();
        t.update(&[det(10.0, 10.0, 50.0, 50.0, 0.9)]);

        t.update(&[]);
        t.update(&[]);
        assert_eq!(t.live_track_count(), 1);
        t.update(&[]);
        assert_eq!(t.live_track_count(), 0);
    }

    #[test]
    fn test_low_confidence_matches_existing_track() {
        let mut t = tracker();
        let first = t.update(&[det(10.0, 10.0, 50.0, 50.0, 0.9)]);
        let id = first[0].track_id;

        // Low-confidence detection at the same position associates via stage 2
        let second = t.update(&[det(12.0, 12.0, 50.0, 50.0, 0.3)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].track_id, id);
    }

    #[test]
    fn test_low_confidence_does_not_start_track() {
        let mut t = tracker();
        let out = t.update(&[det(10.0, 10.0, 50.0, 50.0, 0.3)]);
        assert!(out.is_empty());
        assert_eq!(t.live_track_count(), 0);
    }

    #[test]
    fn test_track_survives_within_max_lost() {
        let mut t = tracker();
        let first = t.update(&[det(10.0, 10.0, 50.0, 50.0, 0.9)]);
        let id = first[0].track_id;

        t.update(&[]);
        t.update(&[]);

        let back = t.update(&[det(12.0, 12.0, 50.0, 50.0, 0.9)]);
        assert_eq!(back[0].track_id, id);
    }
}
