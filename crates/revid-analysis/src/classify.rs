//! Per-frame classification, weighted consensus, and frame quality scoring.

use std::collections::HashMap;

use revid_models::{
    nearest_point, ConsensusResult, FrameClassification, FrameQualityScore, TrajectoryPoint,
};
use revid_ml_client::Detection;

/// Match one frame's detections to a set of track trajectories.
///
/// For every track visible at `timestamp` (nearest trajectory point within
/// 0.5 s), the detection with the highest IoU at or above `min_iou` is
/// assigned to it. Returns `(track_index, classification)` pairs.
pub fn match_frame_to_tracks(
    timestamp: f64,
    detections: &[Detection],
    trajectories: &[&[TrajectoryPoint]],
    min_iou: f64,
) -> Vec<(usize, FrameClassification)> {
    let mut out = Vec::new();

    for (track_idx, traj) in trajectories.iter().enumerate() {
        let Some(point) = nearest_point(traj, timestamp, 0.5) else {
            continue;
        };
        let track_box = point.bbox();

        let mut best_iou = 0.0;
        let mut best: Option<&Detection> = None;
        for det in detections {
            let iou = track_box.iou(&det.bbox);
            if iou > best_iou {
                best_iou = iou;
                best = Some(det);
            }
        }

        if let Some(det) = best {
            if best_iou >= min_iou {
                let (cx, cy) = det.bbox.center();
                out.push((
                    track_idx,
                    FrameClassification {
                        timestamp,
                        class_name: det.class_name.clone(),
                        confidence: det.confidence,
                        bbox_area: det.bbox.area(),
                        bbox_cx: cx,
                        bbox_cy: cy,
                    },
                ));
            }
        }
    }

    out
}

/// Compute a weighted consensus class from per-frame classifications.
///
/// Weight per frame is `confidence * (bbox_area / max_bbox_area)`: frames
/// where the object is large and the model is confident carry more of the
/// vote.
pub fn compute_weighted_consensus(frames: &[FrameClassification]) -> ConsensusResult {
    if frames.is_empty() {
        return ConsensusResult {
            consensus_class: "unknown".to_string(),
            consensus_confidence: 0.0,
            class_distribution: HashMap::new(),
        };
    }

    let mut max_area = frames.iter().map(|f| f.bbox_area).fold(0.0, f64::max);
    if max_area == 0.0 {
        max_area = 1.0;
    }

    let mut class_weights: HashMap<String, f64> = HashMap::new();
    let mut total_weight = 0.0;
    for f in frames {
        let weight = f.confidence as f64 * (f.bbox_area / max_area);
        *class_weights.entry(f.class_name.clone()).or_insert(0.0) += weight;
        total_weight += weight;
    }

    let (consensus_class, winning_weight) = class_weights
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(c, w)| (c.clone(), *w))
        .expect("non-empty class weights");

    let consensus_confidence = if total_weight > 0.0 {
        winning_weight / total_weight
    } else {
        0.0
    };

    let class_distribution = class_weights
        .into_iter()
        .map(|(c, w)| (c, if total_weight > 0.0 { w / total_weight } else { 0.0 }))
        .collect();

    ConsensusResult {
        consensus_class,
        consensus_confidence,
        class_distribution,
    }
}

/// Score each classified frame on crop quality for training suitability.
///
/// Quality is the product of four factors in [0, 1]:
/// - `bbox_area / max_area` (larger object = better crop)
/// - model confidence
/// - class match: 1.0 when the frame agrees with the consensus, 0.3 otherwise
/// - center score: 1.0 inside the middle 60% of the frame, falling linearly
///   to 0.0 at the image edges
///
/// Returned sorted descending by quality.
pub fn score_frame_quality(
    frames: &[FrameClassification],
    consensus_class: &str,
    frame_width: u32,
    frame_height: u32,
) -> Vec<FrameQualityScore> {
    if frames.is_empty() {
        return Vec::new();
    }

    let mut max_area = frames.iter().map(|f| f.bbox_area).fold(0.0, f64::max);
    if max_area == 0.0 {
        max_area = 1.0;
    }

    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let margin_x = fw * 0.2;
    let margin_y = fh * 0.2;

    let axis_score = |c: f64, margin: f64, full: f64| -> f64 {
        if c >= margin && c <= full - margin {
            1.0
        } else if c < margin {
            (c / margin).max(0.0)
        } else {
            ((full - c) / margin).max(0.0)
        }
    };

    let mut scores: Vec<FrameQualityScore> = frames
        .iter()
        .map(|f| {
            let area_norm = f.bbox_area / max_area;
            let class_match = if f.class_name == consensus_class { 1.0 } else { 0.3 };
            let center_score = axis_score(f.bbox_cx, margin_x, fw) * axis_score(f.bbox_cy, margin_y, fh);
            let quality = (area_norm * f.confidence as f64 * class_match * center_score).clamp(0.0, 1.0);
            FrameQualityScore {
                timestamp: f.timestamp,
                quality_score: quality,
                bbox_area: f.bbox_area,
                confidence: f.confidence,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use revid_models::BoundingBox;

    fn fc(class: &str, conf: f32, area: f64) -> FrameClassification {
        FrameClassification {
            timestamp: 0.0,
            class_name: class.into(),
            confidence: conf,
            bbox_area: area,
            bbox_cx: 960.0,
            bbox_cy: 540.0,
        }
    }

    #[test]
    fn test_consensus_weighting_prefers_large_confident_frames() {
        // 6 "car" frames: conf 0.4, area 1000; 4 "SUV" frames: conf 0.9, area 10000.
        // Weights: car = 6 * 0.4 * 0.1 = 0.24; SUV = 4 * 0.9 * 1.0 = 3.6
        let mut frames = Vec::new();
        for _ in 0..6 {
            frames.push(fc("car", 0.4, 1000.0));
        }
        for _ in 0..4 {
            frames.push(fc("SUV", 0.9, 10000.0));
        }

        let consensus = compute_weighted_consensus(&frames);
        assert_eq!(consensus.consensus_class, "SUV");
        assert!((consensus.consensus_confidence - 3.6 / 3.84).abs() < 1e-6);
    }

    #[test]
    fn test_distribution_normalized() {
        let frames = vec![fc("car", 0.5, 100.0), fc("SUV", 0.5, 100.0), fc("car", 0.5, 100.0)];
        let consensus = compute_weighted_consensus(&frames);
        let sum: f64 = consensus.class_distribution.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // Consensus is the argmax of the distribution
        let argmax = consensus
            .class_distribution
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_eq!(argmax, &consensus.consensus_class);
    }

    #[test]
    fn test_empty_frames_yield_unknown() {
        let consensus = compute_weighted_consensus(&[]);
        assert_eq!(consensus.consensus_class, "unknown");
        assert_eq!(consensus.consensus_confidence, 0.0);
    }

    #[test]
    fn test_quality_bounds_and_ordering() {
        let mut frames = vec![fc("car", 0.9, 10000.0), fc("SUV", 0.9, 10000.0), fc("car", 0.2, 500.0)];
        // Push one frame to the far edge: center score should fall to 0
        frames.push(FrameClassification {
            timestamp: 9.0,
            class_name: "car".into(),
            confidence: 0.9,
            bbox_area: 10000.0,
            bbox_cx: 0.0,
            bbox_cy: 540.0,
        });

        let scores = score_frame_quality(&frames, "car", 1920, 1080);
        assert_eq!(scores.len(), 4);
        for s in &scores {
            assert!((0.0..=1.0).contains(&s.quality_score));
        }
        // Sorted descending
        for pair in scores.windows(2) {
            assert!(pair[0].quality_score >= pair[1].quality_score);
        }
        // The centered consensus-class frame beats the off-class frame
        assert!(scores[0].quality_score > 0.5);
        let edge = scores.iter().find(|s| s.timestamp == 9.0).unwrap();
        assert_eq!(edge.quality_score, 0.0);
    }

    #[test]
    fn test_frame_matching_requires_iou() {
        let traj = vec![TrajectoryPoint {
            timestamp: 1.0,
            x: 100.0,
            y: 100.0,
            w: 50.0,
            h: 50.0,
            conf: 0.9,
        }];
        let trajectories: Vec<&[TrajectoryPoint]> = vec![&traj];

        let near = Detection {
            bbox: BoundingBox::new(105.0, 105.0, 50.0, 50.0),
            class_name: "car".into(),
            class_id: 2,
            confidence: 0.8,
        };
        let far = Detection {
            bbox: BoundingBox::new(900.0, 900.0, 50.0, 50.0),
            class_name: "car".into(),
            class_id: 2,
            confidence: 0.9,
        };

        let matched = match_frame_to_tracks(1.0, &[far.clone(), near], &trajectories, 0.15);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0, 0);

        // Only the far detection: no match survives the IoU gate
        let unmatched = match_frame_to_tracks(1.0, &[far], &trajectories, 0.15);
        assert!(unmatched.is_empty());

        // Track not visible at this timestamp
        let invisible = match_frame_to_tracks(5.0, &[], &trajectories, 0.15);
        assert!(invisible.is_empty());
    }
}
