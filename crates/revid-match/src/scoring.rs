//! Scoring primitives shared by the cross-camera matchers.

use revid_models::{ClassTaxonomy, MatchWeights, TopologyEdge};

/// Observation span of a track in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Departure-to-arrival gap between two spans: time between last_seen on one
/// camera and first_seen on the other, taking the more favorable direction.
/// Negative means the cameras saw the vehicle simultaneously.
pub fn departure_arrival_gap(a: &TimeSpan, b: &TimeSpan) -> f64 {
    let gap_a_to_b = b.start - a.end;
    let gap_b_to_a = a.start - b.end;
    gap_a_to_b.min(gap_b_to_a)
}

/// Gap between the closest endpoints, for reporting on links.
pub fn endpoint_gap(a: &TimeSpan, b: &TimeSpan) -> f64 {
    (b.start - a.end).abs().min((a.start - b.end).abs())
}

/// Tiered temporal plausibility score, 0 to `weights.temporal_max_score`.
///
/// Measures the actual departure-to-arrival transit rather than naive range
/// overlap, which handles long-lived tracks (a parked vehicle visible all
/// day). Overlapping ranges are keyed on the first-seen gap instead: two
/// all-day tracks always overlap, but first-seen times hours apart mean
/// different vehicles. `direction_match == Some(false)` (travel opposes
/// learned topology) multiplies the score by the direction penalty.
///
/// Returns 0.0 when the pair is temporally implausible.
pub fn temporal_tier_score(
    a: &TimeSpan,
    b: &TimeSpan,
    edge: &TopologyEdge,
    weights: &MatchWeights,
    direction_match: Option<bool>,
) -> f64 {
    let max_transit = edge.max_transit_seconds;
    let avg_transit = edge.avg_or_default();
    let gap = departure_arrival_gap(a, b);

    let mut score = if gap <= 0.0 {
        let first_seen_gap = (a.start - b.start).abs();
        if first_seen_gap <= max_transit {
            weights.temporal_max_score
        } else if first_seen_gap <= max_transit * weights.overlap_first_seen_slack_factor {
            weights.temporal_max_score * 0.4
        } else {
            weights.temporal_max_score * 0.1
        }
    } else if gap <= avg_transit * 1.5 {
        // Near expected transit time (includes brief stops)
        weights.temporal_max_score * 0.9
    } else if gap <= max_transit {
        // Plausible with a longer stop
        weights.temporal_max_score * 0.6
    } else {
        return 0.0;
    };

    if direction_match == Some(false) {
        score *= weights.direction_penalty;
    }
    score
}

/// ReID tier score for camera-object tracks. Same-camera embeddings are
/// near-identical; the faint cross-track identity signal lives above
/// `min_reid_similarity`.
pub fn reid_tier_camera_object(similarity: f64, weights: &MatchWeights) -> f64 {
    let max = weights.reid_max_score;
    if similarity >= 0.99 {
        max
    } else if similarity >= 0.985 {
        max * 0.85
    } else if similarity >= 0.98 {
        max * 0.70
    } else if similarity >= 0.975 {
        max * 0.55
    } else if similarity >= weights.min_reid_similarity {
        max * 0.35
    } else {
        0.0
    }
}

/// ReID tier score for video tracks. Cross-camera same-vehicle similarity
/// typically lands in 0.35-0.73 because of the viewpoint change.
pub fn reid_tier_video(similarity: f64, weights: &MatchWeights) -> f64 {
    reid_tier_direction(similarity, weights.reid_max_score)
}

/// Cross-camera ReID tier mapping over an arbitrary weight: full at 0.65,
/// then 70% / 40% / 20% steps down to the 0.35 floor. Shared by the
/// video-track and direction matchers.
pub fn reid_tier_direction(similarity: f64, max_score: f64) -> f64 {
    if similarity >= 0.65 {
        max_score
    } else if similarity >= 0.55 {
        max_score * 0.70
    } else if similarity >= 0.45 {
        max_score * 0.40
    } else if similarity >= 0.35 {
        max_score * 0.20
    } else {
        0.0
    }
}

/// Size similarity score from bbox areas. Different cameras have very
/// different perspectives, so only ratios above `min_size_ratio` score.
pub fn size_ratio_score(area_a: f64, area_b: f64, max_score: f64, min_ratio: f64) -> f64 {
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    let ratio = area_a.min(area_b) / area_a.max(area_b);
    if ratio > min_ratio {
        max_score * ratio
    } else {
        0.0
    }
}

/// Classification consistency score.
///
/// Returns `(score, is_match)`: `is_match` is `Some(false)` only for a true
/// conflict (both classified, different compatibility groups), which callers
/// treat as a hard veto.
pub fn classification_score(
    taxonomy: &ClassTaxonomy,
    cls_a: Option<&str>,
    cls_b: Option<&str>,
    weights: &MatchWeights,
) -> (f64, Option<bool>) {
    match taxonomy.are_compatible(cls_a, cls_b) {
        None => {
            // One or both unclassified: neutral, slight positive
            let score = if cls_a.is_none() && cls_b.is_none() { 0.1 } else { 0.05 };
            (score, None)
        }
        Some(true) => {
            if cls_a == cls_b {
                (weights.classification_match_score, Some(true))
            } else {
                // Compatible mismatch: reduced positive score
                (weights.classification_match_score * 0.6, Some(true))
            }
        }
        Some(false) => (weights.classification_conflict_penalty, Some(false)),
    }
}

/// Method string recorded on links, e.g. "reid+temporal+classification".
pub fn determine_method(reid_similarity: Option<f64>, temporal_score: f64, cls_match: Option<bool>) -> String {
    let mut parts = Vec::new();
    if reid_similarity.is_some_and(|s| s > 0.3) {
        parts.push("reid");
    }
    if temporal_score > 0.0 {
        parts.push("temporal");
    }
    if cls_match == Some(true) {
        parts.push("classification");
    }
    if parts.is_empty() {
        "combined".to_string()
    } else {
        parts.join("+")
    }
}
