//! Crossing-line spatial matcher.
//!
//! A configured pair of line segments, one per camera, represents the same
//! physical boundary seen from two angles. A vehicle's lane position is its
//! bbox centroid projected onto the line; matching vehicles cross at the
//! same lane position within the learned transit window. Runs before the
//! ReID matcher so high-confidence spatial matches are locked in first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use revid_models::{
    CameraObjectTrack, ClassTaxonomy, CrossCameraLink, CrossingLine, LinkStatus, MatchWeights,
    SourceTrackType, TopologyEdge, TrackId,
};
use revid_store::{LinkUpsert, Store};
use tracing::{debug, info};

use crate::direction::track_motion_sources;
use crate::error::MatchResult;
use crate::scoring::size_ratio_score;
use crate::topology::TopologyCache;

/// Score breakdown for one crossing-line pair.
#[derive(Debug, Clone)]
pub struct CrossingScore {
    pub total: f64,
    pub lane_score: f64,
    pub temporal_score: f64,
    pub size_score: f64,
    pub lane_distance: f64,
    pub temporal_gap: f64,
    /// `Some(false)` never escapes scoring; disagreement is a hard reject
    pub direction_agreed: Option<bool>,
    /// Whether both subtypes are known and equal
    pub classification_match: Option<bool>,
}

/// One accepted spatial match.
#[derive(Debug, Clone)]
pub struct CrossingMatch {
    pub track_a_id: TrackId,
    pub track_b_id: TrackId,
    pub crossing_line_id: i64,
    pub score: CrossingScore,
}

/// Summary of a full crossing-line run.
#[derive(Debug, Clone, Default)]
pub struct CrossingRunSummary {
    pub links_created: usize,
    pub line_pairs: usize,
    /// Normalized pairs linked here; the ReID pass excludes them
    pub matched_pairs: Vec<(TrackId, TrackId)>,
}

/// The crossing-line matcher.
pub struct CrossingLineMatcher {
    store: Store,
    topology: Arc<TopologyCache>,
    weights: MatchWeights,
    taxonomy: ClassTaxonomy,
}

impl CrossingLineMatcher {
    pub fn new(
        store: Store,
        topology: Arc<TopologyCache>,
        weights: MatchWeights,
        taxonomy: ClassTaxonomy,
    ) -> Self {
        Self {
            store,
            topology,
            weights,
            taxonomy,
        }
    }

    /// Match tracks across one pair of crossing lines.
    pub async fn match_line_pair(
        &self,
        line_a: &CrossingLine,
        line_b: &CrossingLine,
        entity_type: &str,
    ) -> MatchResult<Vec<CrossingMatch>> {
        let cam_a = &line_a.camera_id;
        let cam_b = &line_b.camera_id;

        let Some((edge, _)) = self.topology.get_pair(cam_a, cam_b).await? else {
            debug!(camera_a = %cam_a, camera_b = %cam_b, "No topology for crossing-line pair");
            return Ok(Vec::new());
        };

        let scenario = format!("{entity_type}_detection");
        let tracks_a = self.store.list_approved_tracks(cam_a, &scenario).await?;
        let tracks_b = self.store.list_approved_tracks(cam_b, &scenario).await?;
        if tracks_a.is_empty() || tracks_b.is_empty() {
            return Ok(Vec::new());
        }

        // Directions are loaded once per track; disagreement with the line
        // forward vectors is a hard filter below
        let mut directions: HashMap<TrackId, Option<(f64, f64)>> = HashMap::new();
        for t in tracks_a.iter().chain(tracks_b.iter()) {
            let (direction, _) = track_motion_sources(&self.store, t).await?;
            directions.insert(t.id, direction);
        }

        let mut best_for_a: HashMap<TrackId, (f64, TrackId, CrossingScore)> = HashMap::new();
        let mut best_for_b: HashMap<TrackId, (f64, TrackId)> = HashMap::new();

        for ta in &tracks_a {
            for tb in &tracks_b {
                let Some(score) = self.score_pair(ta, tb, line_a, line_b, &edge, &directions) else {
                    continue;
                };
                if score.total < self.weights.crossing.match_threshold {
                    continue;
                }

                let total = score.total;
                if best_for_a.get(&ta.id).is_none_or(|(s, _, _)| total > *s) {
                    best_for_a.insert(ta.id, (total, tb.id, score.clone()));
                }
                if best_for_b.get(&tb.id).is_none_or(|(s, _)| total > *s) {
                    best_for_b.insert(tb.id, (total, ta.id));
                }
            }
        }

        let mut matches = Vec::new();
        for (a_id, (_, b_id, score)) in best_for_a {
            if best_for_b.get(&b_id).is_some_and(|(_, back)| *back == a_id) {
                matches.push(CrossingMatch {
                    track_a_id: a_id,
                    track_b_id: b_id,
                    crossing_line_id: line_a.id,
                    score,
                });
            }
        }

        info!(
            line_a = %line_a.line_name,
            line_b = %line_b.line_name,
            camera_a = %cam_a,
            camera_b = %cam_b,
            matches = matches.len(),
            "Crossing-line pair matched"
        );
        Ok(matches)
    }

    /// Score one candidate pair across paired lines.
    fn score_pair(
        &self,
        ta: &CameraObjectTrack,
        tb: &CameraObjectTrack,
        line_a: &CrossingLine,
        line_b: &CrossingLine,
        edge: &TopologyEdge,
        directions: &HashMap<TrackId, Option<(f64, f64)>>,
    ) -> Option<CrossingScore> {
        let w = &self.weights.crossing;

        // Hard filter: classification mismatch across compatibility groups
        if self
            .taxonomy
            .are_compatible(ta.vehicle_subtype(), tb.vehicle_subtype())
            == Some(false)
        {
            return None;
        }

        // Hard filter: temporal gap beyond max transit. Overlapping ranges
        // are allowed only when the first-seen gap is also inside the window
        let gap_a_to_b = tb.first_seen - ta.last_seen;
        let gap_b_to_a = ta.first_seen - tb.last_seen;
        let gap = gap_a_to_b.min(gap_b_to_a);
        let first_seen_gap = (ta.first_seen - tb.first_seen).abs();
        let max_transit = edge.max_transit_seconds;
        let avg_transit = edge.avg_or_default();

        if gap > max_transit {
            return None;
        }
        if gap <= 0.0 && first_seen_gap > max_transit {
            return None;
        }

        let temporal_score = if gap <= 0.0 && first_seen_gap <= max_transit {
            w.temporal
        } else if gap <= avg_transit * 1.5 {
            w.temporal * 0.9
        } else if gap <= max_transit {
            w.temporal * 0.6
        } else {
            0.0
        };

        // Lane proximity: project both centroids; a reversed pair flag means
        // line B's lane coordinate runs backwards relative to line A's
        let lane_a = line_a.lane_position(ta.bbox_centroid_x, ta.bbox_centroid_y);
        let mut lane_b = line_b.lane_position(tb.bbox_centroid_x, tb.bbox_centroid_y);
        if line_a.lane_mapping_reversed || line_b.lane_mapping_reversed {
            lane_b = 1.0 - lane_b;
        }
        let lane_distance = (lane_a - lane_b).abs();
        let lane_score = w.lane * (1.0 - lane_distance);

        let size_score = size_ratio_score(
            ta.avg_area(),
            tb.avg_area(),
            w.size,
            self.weights.min_size_ratio,
        );

        // Hard direction filter: when both tracks have a known direction and
        // their agreement with the line forward vectors differs, reject
        let match_a = line_a.direction_match(directions.get(&ta.id).copied().flatten());
        let match_b = line_b.direction_match(directions.get(&tb.id).copied().flatten());
        let direction_agreed = match (match_a, match_b) {
            (Some(a), Some(b)) => {
                if a != b {
                    return None;
                }
                Some(true)
            }
            _ => None,
        };

        let classification_match = match (ta.vehicle_subtype(), tb.vehicle_subtype()) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        };

        Some(CrossingScore {
            total: lane_score + temporal_score + size_score,
            lane_score,
            temporal_score,
            size_score,
            lane_distance,
            temporal_gap: gap,
            direction_agreed,
            classification_match,
        })
    }

    /// Run spatial matching for every paired crossing line and persist the
    /// accepted links.
    pub async fn match_all(&self, entity_type: &str) -> MatchResult<CrossingRunSummary> {
        let mut summary = CrossingRunSummary::default();
        let rejected = self.store.rejected_pairs().await?;
        let mut claimed: HashSet<(TrackId, TrackId)> = HashSet::new();

        for (line_a, line_b) in self.store.list_paired_crossing_lines().await? {
            let matches = self.match_line_pair(&line_a, &line_b, entity_type).await?;
            summary.line_pairs += 1;

            for m in matches {
                let pair = CrossCameraLink::normalize_pair(m.track_a_id, m.track_b_id);
                if rejected.contains(&pair) || !claimed.insert(pair) {
                    continue;
                }
                self.create_link(&m, entity_type).await?;
                summary.links_created += 1;
                summary.matched_pairs.push(pair);
            }
        }

        info!(
            links = summary.links_created,
            line_pairs = summary.line_pairs,
            "Crossing-line matching complete"
        );
        Ok(summary)
    }

    async fn create_link(&self, m: &CrossingMatch, entity_type: &str) -> MatchResult<()> {
        let status = if m.score.total >= self.weights.crossing.auto_confirm_threshold {
            LinkStatus::AutoConfirmed
        } else {
            LinkStatus::Auto
        };
        self.store
            .upsert_link(LinkUpsert {
                track_a_id: m.track_a_id,
                track_b_id: m.track_b_id,
                entity_type: entity_type.to_string(),
                match_confidence: m.score.total,
                match_method: "crossing_line".to_string(),
                reid_similarity: None,
                temporal_gap_seconds: Some(m.score.temporal_gap),
                classification_match: m.score.classification_match,
                lane_distance: Some(m.score.lane_distance),
                crossing_line_id: Some(m.crossing_line_id),
                status,
                source_track_type: SourceTrackType::CameraObject,
            })
            .await?;
        Ok(())
    }
}
