//! Matcher and analysis configuration records.
//!
//! All scoring weights live in these structs and are threaded through the
//! matchers wholesale, so an A/B experiment can substitute a whole record.

use serde::{Deserialize, Serialize};

/// Weights for the direction-based cross-camera matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionWeights {
    pub temporal: f64,
    pub reid: f64,
    pub color: f64,
    pub size: f64,
    /// Minimum total score to accept a pair
    pub match_threshold: f64,
}

impl Default for DirectionWeights {
    fn default() -> Self {
        Self {
            temporal: 0.30,
            reid: 0.30,
            color: 0.20,
            size: 0.20,
            match_threshold: 0.40,
        }
    }
}

/// Weights for the crossing-line matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossingWeights {
    pub lane: f64,
    pub temporal: f64,
    pub size: f64,
    /// Minimum total score to accept a pair
    pub match_threshold: f64,
    /// Links at or above this total skip human review
    pub auto_confirm_threshold: f64,
}

impl Default for CrossingWeights {
    fn default() -> Self {
        Self {
            lane: 0.50,
            temporal: 0.35,
            size: 0.15,
            match_threshold: 0.55,
            auto_confirm_threshold: 0.90,
        }
    }
}

/// Scoring configuration shared by the cross-camera matchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    // ReID-based track matcher (camera-object and video tracks)
    pub temporal_max_score: f64,
    pub reid_max_score: f64,
    pub classification_match_score: f64,
    pub classification_conflict_penalty: f64,
    pub bbox_size_max_score: f64,
    /// Accept threshold for camera-object track pairs
    pub match_threshold: f64,
    /// Accept threshold for video track pairs; real timestamps carry more
    /// signal, so this is lower
    pub video_track_match_threshold: f64,
    /// Same-camera embeddings carry no identity signal below this similarity
    pub min_reid_similarity: f64,

    // Direction handling
    /// Multiplier on the temporal score when travel opposes learned topology
    pub direction_penalty: f64,
    /// Direction-compatibility scores below this veto the pair outright
    pub direction_veto: f64,

    // Temporal tiering
    /// Overlapping long-lived tracks still score (at 0.4x) when their
    /// first-seen gap is within this multiple of max transit
    pub overlap_first_seen_slack_factor: f64,

    // Pre-match track filters
    pub min_traj_points: usize,
    pub min_traj_duration_sec: f64,
    /// Minimum bbox area ratio before the size score applies
    pub min_size_ratio: f64,

    pub direction: DirectionWeights,
    pub crossing: CrossingWeights,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            temporal_max_score: 0.35,
            reid_max_score: 0.25,
            classification_match_score: 0.25,
            classification_conflict_penalty: -0.3,
            bbox_size_max_score: 0.15,
            match_threshold: 0.80,
            video_track_match_threshold: 0.60,
            min_reid_similarity: 0.95,
            direction_penalty: 0.7,
            direction_veto: 0.3,
            overlap_first_seen_slack_factor: 3.0,
            min_traj_points: 5,
            min_traj_duration_sec: 0.3,
            min_size_ratio: 0.3,
            direction: DirectionWeights::default(),
            crossing: CrossingWeights::default(),
        }
    }
}

impl MatchWeights {
    /// Read overrides from the environment, keeping defaults elsewhere.
    pub fn from_env() -> Self {
        fn env_f64(key: &str, default: f64) -> f64 {
            std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
        }
        let defaults = Self::default();
        Self {
            temporal_max_score: env_f64("TEMPORAL_MAX_SCORE", defaults.temporal_max_score),
            reid_max_score: env_f64("REID_MAX_SCORE", defaults.reid_max_score),
            classification_match_score: env_f64("CLS_MATCH_SCORE", defaults.classification_match_score),
            classification_conflict_penalty: env_f64("CLS_CONFLICT_PENALTY", defaults.classification_conflict_penalty),
            bbox_size_max_score: env_f64("BBOX_SIZE_MAX_SCORE", defaults.bbox_size_max_score),
            match_threshold: env_f64("MATCH_THRESHOLD", defaults.match_threshold),
            video_track_match_threshold: env_f64("VIDEO_TRACK_MATCH_THRESHOLD", defaults.video_track_match_threshold),
            direction_penalty: env_f64("DIRECTION_PENALTY", defaults.direction_penalty),
            direction_veto: env_f64("DIRECTION_VETO", defaults.direction_veto),
            direction: DirectionWeights {
                match_threshold: env_f64("DIRECTION_MATCH_THRESHOLD", defaults.direction.match_threshold),
                ..defaults.direction
            },
            crossing: CrossingWeights {
                match_threshold: env_f64("CROSSING_MATCH_THRESHOLD", defaults.crossing.match_threshold),
                ..defaults.crossing
            },
            ..defaults
        }
    }
}

/// Clip analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum detection confidence retained during per-frame classification.
    /// Kept low to capture all detections.
    pub inference_conf: f32,
    /// Reject sanitized clips shorter than this
    pub min_clip_duration_sec: f64,
    /// Mean IoU at which overlapping tracks merge
    pub iou_merge_threshold: f64,
    /// IoU-min threshold in the second-pass nearest-neighbour merge
    pub iou_min_nearest: f64,
    /// Shared timestamps needed before the first-pass merge applies
    pub min_shared_points: usize,
    /// Max end-to-start gap for sequential stitching
    pub stitch_max_gap_sec: f64,
    /// IoU (max of IoU and IoU-min) for sequential stitching
    pub stitch_iou_threshold: f64,
    /// Displacement/diagonal ratio flagged as a trajectory jump
    pub jump_multiplier: f64,
    /// Shortest post-jump segment retained
    pub min_segment_frames: usize,
    /// Jump cleaning can in principle discard a real long-exposure track of
    /// a fast vehicle; this flag lets an operator disable the pass
    pub clean_jumps: bool,
    /// Sample every 2nd frame for clips longer than this
    pub sparse_sample_over_sec: f64,
    /// Minimum IoU to assign a detection to a track during classification
    pub classify_min_iou: f64,
    /// Drop detections smaller than this in either dimension, pixels
    pub min_box_px: f64,
    /// Frame dimensions used for the center score when the video row has none
    pub default_frame_width: u32,
    pub default_frame_height: u32,
    /// Quality threshold for training-frame export
    pub export_min_quality: f64,
    /// Max frames exported per analysis
    pub export_top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            inference_conf: 0.08,
            min_clip_duration_sec: 2.0,
            iou_merge_threshold: 0.35,
            iou_min_nearest: 0.20,
            min_shared_points: 3,
            stitch_max_gap_sec: 3.0,
            stitch_iou_threshold: 0.30,
            jump_multiplier: 3.0,
            min_segment_frames: 3,
            clean_jumps: true,
            sparse_sample_over_sec: 60.0,
            classify_min_iou: 0.15,
            min_box_px: 5.0,
            default_frame_width: 1920,
            default_frame_height: 1080,
            export_min_quality: 0.5,
            export_top_n: 10,
        }
    }
}

impl AnalysisConfig {
    /// Read overrides from the environment, keeping defaults elsewhere.
    pub fn from_env() -> Self {
        fn env_f64(key: &str, default: f64) -> f64 {
            std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
        }
        fn env_usize(key: &str, default: usize) -> usize {
            std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
        }
        let defaults = Self::default();
        Self {
            inference_conf: env_f64("INFERENCE_CONF", defaults.inference_conf as f64) as f32,
            min_clip_duration_sec: env_f64("MIN_CLIP_DURATION_SEC", defaults.min_clip_duration_sec),
            iou_merge_threshold: env_f64("IOU_MERGE_THRESHOLD", defaults.iou_merge_threshold),
            iou_min_nearest: env_f64("IOU_MIN_NEAREST", defaults.iou_min_nearest),
            stitch_max_gap_sec: env_f64("STITCH_MAX_GAP_SEC", defaults.stitch_max_gap_sec),
            jump_multiplier: env_f64("JUMP_MULTIPLIER", defaults.jump_multiplier),
            min_segment_frames: env_usize("MIN_SEGMENT_FRAMES", defaults.min_segment_frames),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_weights_sum_to_one() {
        let w = DirectionWeights::default();
        assert!((w.temporal + w.reid + w.color + w.size - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_crossing_weights_sum_to_one() {
        let w = CrossingWeights::default();
        assert!((w.lane + w.temporal + w.size - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let w = MatchWeights::default();
        assert_eq!(w.match_threshold, 0.80);
        assert_eq!(w.video_track_match_threshold, 0.60);
        assert_eq!(w.direction.match_threshold, 0.40);
        assert_eq!(w.crossing.match_threshold, 0.55);

        let a = AnalysisConfig::default();
        assert_eq!(a.min_clip_duration_sec, 2.0);
        assert_eq!(a.jump_multiplier, 3.0);
        assert_eq!(a.min_segment_frames, 3);
    }
}
