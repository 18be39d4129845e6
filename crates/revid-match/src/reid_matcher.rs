//! ReID-based cross-camera track matcher.
//!
//! Scores pairs of tracks on temporal plausibility (learned transit times),
//! appearance-embedding similarity, classification consistency, and bbox
//! size, then accepts only mutual best matches. Runs over camera-object
//! tracks (review-time aggregates) and over video tracks (MOT output with
//! real epoch timestamps and per-track embeddings).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use revid_models::{
    compute_travel_direction, direction_compatibility, CameraObjectTrack, LinkStatus, MatchWeights,
    ClassTaxonomy, SourceTrackType, TopologyEdge, TrackId, VideoTrack,
};
use revid_ml_client::types::cosine_similarity;
use revid_store::{LinkUpsert, Store};
use tracing::{debug, info};

use crate::error::MatchResult;
use crate::scoring::{
    classification_score, determine_method, endpoint_gap, reid_tier_camera_object, reid_tier_video,
    size_ratio_score, temporal_tier_score, TimeSpan,
};
use crate::topology::TopologyCache;

/// Per-camera-pair matching summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairSummary {
    pub links_created: usize,
    pub pairs_evaluated: usize,
    pub direction_vetoed: usize,
}

/// Scenario namespace for an entity type ("vehicle" -> "vehicle_detection").
fn scenario_for(entity_type: &str) -> String {
    format!("{entity_type}_detection")
}

struct Candidate {
    score: f64,
    upsert: LinkUpsert,
}

/// Mutual best-match resolution: a pair is accepted only when each side is
/// the other's best-scoring partner. No two accepted links from one batch
/// share a track id.
fn mutual_best(candidates: Vec<(TrackId, TrackId, Candidate)>) -> Vec<Candidate> {
    let mut best_for_a: HashMap<TrackId, (f64, TrackId)> = HashMap::new();
    let mut best_for_b: HashMap<TrackId, (f64, TrackId)> = HashMap::new();
    let mut by_pair: HashMap<(TrackId, TrackId), Candidate> = HashMap::new();

    for (a, b, candidate) in candidates {
        let score = candidate.score;
        if best_for_a.get(&a).is_none_or(|(s, _)| score > *s) {
            best_for_a.insert(a, (score, b));
        }
        if best_for_b.get(&b).is_none_or(|(s, _)| score > *s) {
            best_for_b.insert(b, (score, a));
        }
        by_pair.insert((a, b), candidate);
    }

    let mut accepted = Vec::new();
    for (a, (_, b)) in &best_for_a {
        if best_for_b.get(b).is_some_and(|(_, back)| back == a) {
            if let Some(candidate) = by_pair.remove(&(*a, *b)) {
                accepted.push(candidate);
            }
        }
    }
    accepted
}

/// The ReID track matcher.
pub struct ReidTrackMatcher {
    store: Store,
    topology: Arc<TopologyCache>,
    weights: MatchWeights,
    taxonomy: ClassTaxonomy,
    /// Normalized pairs already settled by a higher-priority matcher
    /// (crossing lines); never re-linked here.
    exclude_pairs: HashSet<(TrackId, TrackId)>,
}

impl ReidTrackMatcher {
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
            exclude_pairs: HashSet::new(),
        }
    }

    /// Exclude pairs already matched spatially.
    pub fn exclude_pairs(&mut self, pairs: impl IntoIterator<Item = (TrackId, TrackId)>) {
        for (a, b) in pairs {
            self.exclude_pairs
                .insert(revid_models::CrossCameraLink::normalize_pair(a, b));
        }
    }

    /// Topology-order direction hint: for one-way topology, the track on the
    /// upstream camera should be seen first.
    fn topology_direction_match(
        edge_is_ab: bool,
        bidirectional: bool,
        a_first_seen: f64,
        b_first_seen: f64,
    ) -> Option<bool> {
        if bidirectional {
            return None;
        }
        if edge_is_ab {
            Some(a_first_seen <= b_first_seen)
        } else {
            Some(b_first_seen <= a_first_seen)
        }
    }

    // ------------------------------------------------------------------
    // Camera-object tracks
    // ------------------------------------------------------------------

    /// Match approved camera-object tracks between two cameras.
    pub async fn match_cameras(
        &self,
        camera_a: &str,
        camera_b: &str,
        entity_type: &str,
    ) -> MatchResult<PairSummary> {
        let Some((edge, bidirectional)) = self.topology.get_pair(camera_a, camera_b).await? else {
            debug!(camera_a, camera_b, "No topology, skipping pair");
            return Ok(PairSummary::default());
        };
        let edge_is_ab = edge.camera_a == camera_a;

        let scenario = scenario_for(entity_type);
        let tracks_a = self.store.list_approved_tracks(camera_a, &scenario).await?;
        let tracks_b = self.store.list_approved_tracks(camera_b, &scenario).await?;
        info!(
            camera_a,
            camera_b,
            a = tracks_a.len(),
            b = tracks_b.len(),
            bidirectional,
            "Matching camera-object tracks"
        );
        if tracks_a.is_empty() || tracks_b.is_empty() {
            return Ok(PairSummary::default());
        }

        let mut summary = PairSummary::default();
        let mut candidates = Vec::new();

        for ta in &tracks_a {
            for tb in &tracks_b {
                summary.pairs_evaluated += 1;
                if let Some(candidate) =
                    self.score_camera_object_pair(ta, tb, &edge, edge_is_ab, bidirectional, entity_type)
                {
                    candidates.push((ta.id, tb.id, candidate));
                }
            }
        }

        for candidate in mutual_best(candidates) {
            if self.create_link(candidate).await?.is_some() {
                summary.links_created += 1;
            }
        }

        info!(
            camera_a,
            camera_b,
            links = summary.links_created,
            evaluated = summary.pairs_evaluated,
            "Camera-object matching complete"
        );
        Ok(summary)
    }

    fn score_camera_object_pair(
        &self,
        ta: &CameraObjectTrack,
        tb: &CameraObjectTrack,
        edge: &TopologyEdge,
        edge_is_ab: bool,
        bidirectional: bool,
        entity_type: &str,
    ) -> Option<Candidate> {
        let span_a = TimeSpan::new(ta.first_seen, ta.last_seen);
        let span_b = TimeSpan::new(tb.first_seen, tb.last_seen);

        let direction_match =
            Self::topology_direction_match(edge_is_ab, bidirectional, ta.first_seen, tb.first_seen);

        let temporal = temporal_tier_score(&span_a, &span_b, edge, &self.weights, direction_match);
        if temporal == 0.0 {
            return None;
        }

        let reid_sim = match (&ta.reid_embedding, &tb.reid_embedding) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b) as f64),
            _ => None,
        };
        let reid = reid_sim
            .map(|s| reid_tier_camera_object(s, &self.weights))
            .unwrap_or(0.0);

        let (cls_score, cls_match) = classification_score(
            &self.taxonomy,
            ta.vehicle_subtype(),
            tb.vehicle_subtype(),
            &self.weights,
        );
        // Hard veto: conflicting classifications
        if cls_match == Some(false) {
            return None;
        }

        let bbox = size_ratio_score(
            ta.avg_area(),
            tb.avg_area(),
            self.weights.bbox_size_max_score,
            self.weights.min_size_ratio,
        );

        let total = temporal + reid + cls_score + bbox;
        if total < self.weights.match_threshold {
            return None;
        }

        Some(Candidate {
            score: total,
            upsert: LinkUpsert {
                track_a_id: ta.id,
                track_b_id: tb.id,
                entity_type: entity_type.to_string(),
                match_confidence: total,
                match_method: determine_method(reid_sim, temporal, cls_match),
                reid_similarity: reid_sim,
                temporal_gap_seconds: Some(endpoint_gap(&span_a, &span_b)),
                classification_match: cls_match,
                lane_distance: None,
                crossing_line_id: None,
                status: LinkStatus::Auto,
                source_track_type: SourceTrackType::CameraObject,
            },
        })
    }

    // ------------------------------------------------------------------
    // Video tracks
    // ------------------------------------------------------------------

    /// Match active video tracks between two cameras using real epoch
    /// timestamps and per-track embeddings.
    pub async fn match_video_tracks_cameras(
        &self,
        camera_a: &str,
        camera_b: &str,
        entity_type: &str,
    ) -> MatchResult<PairSummary> {
        let Some((edge, bidirectional)) = self.topology.get_pair(camera_a, camera_b).await? else {
            return Ok(PairSummary::default());
        };
        let edge_is_ab = edge.camera_a == camera_a;

        let mut tracks_a = self.store.list_active_video_tracks_for_camera(camera_a).await?;
        let mut tracks_b = self.store.list_active_video_tracks_for_camera(camera_b).await?;

        // Tiny tracks produce noisy velocity and direction estimates and are
        // usually tracker glitches or momentary false positives
        let keep = |t: &VideoTrack| {
            t.trajectory.len() >= self.weights.min_traj_points
                && t.span_seconds() >= self.weights.min_traj_duration_sec
        };
        let before = (tracks_a.len(), tracks_b.len());
        tracks_a.retain(keep);
        tracks_b.retain(keep);
        if before != (tracks_a.len(), tracks_b.len()) {
            debug!(
                filtered_a = before.0 - tracks_a.len(),
                filtered_b = before.1 - tracks_b.len(),
                "Filtered short video tracks"
            );
        }
        if tracks_a.is_empty() || tracks_b.is_empty() {
            return Ok(PairSummary::default());
        }

        // Pre-compute motions once per track
        let motions: HashMap<TrackId, Option<revid_models::TrackMotion>> = tracks_a
            .iter()
            .chain(tracks_b.iter())
            .map(|t| (t.id, compute_travel_direction(&t.trajectory)))
            .collect();

        let mut summary = PairSummary::default();
        let mut candidates = Vec::new();

        for ta in &tracks_a {
            for tb in &tracks_b {
                summary.pairs_evaluated += 1;

                let dir_compat = direction_compatibility(
                    motions.get(&ta.id).and_then(|m| m.as_ref()),
                    motions.get(&tb.id).and_then(|m| m.as_ref()),
                );
                // Hard veto: confidently opposite directions
                if dir_compat < self.weights.direction_veto {
                    summary.direction_vetoed += 1;
                    continue;
                }

                if let Some(candidate) = self.score_video_track_pair(
                    ta,
                    tb,
                    &edge,
                    edge_is_ab,
                    bidirectional,
                    dir_compat,
                    entity_type,
                ) {
                    candidates.push((ta.id, tb.id, candidate));
                }
            }
        }

        for candidate in mutual_best(candidates) {
            if self.create_link(candidate).await?.is_some() {
                summary.links_created += 1;
            }
        }

        info!(
            camera_a,
            camera_b,
            links = summary.links_created,
            evaluated = summary.pairs_evaluated,
            direction_vetoed = summary.direction_vetoed,
            "Video-track matching complete"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn score_video_track_pair(
        &self,
        ta: &VideoTrack,
        tb: &VideoTrack,
        edge: &TopologyEdge,
        edge_is_ab: bool,
        bidirectional: bool,
        dir_compat: f64,
        entity_type: &str,
    ) -> Option<Candidate> {
        let span_a = TimeSpan::new(ta.first_seen_epoch, ta.last_seen_epoch);
        let span_b = TimeSpan::new(tb.first_seen_epoch, tb.last_seen_epoch);

        let direction_match = Self::topology_direction_match(
            edge_is_ab,
            bidirectional,
            ta.first_seen_epoch,
            tb.first_seen_epoch,
        );

        let temporal = temporal_tier_score(&span_a, &span_b, edge, &self.weights, direction_match);
        if temporal == 0.0 {
            return None;
        }

        let reid_sim = match (&ta.reid_embedding, &tb.reid_embedding) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b) as f64),
            _ => None,
        };
        let reid = reid_sim.map(|s| reid_tier_video(s, &self.weights)).unwrap_or(0.0);

        let (cls_score, cls_match) = classification_score(
            &self.taxonomy,
            Some(ta.class_name.as_str()),
            Some(tb.class_name.as_str()),
            &self.weights,
        );
        if cls_match == Some(false) {
            return None;
        }

        let bbox = size_ratio_score(
            ta.avg_area(),
            tb.avg_area(),
            self.weights.bbox_size_max_score,
            self.weights.min_size_ratio,
        );

        // Direction compatibility multiplies the whole score: fully
        // compatible is neutral, ambiguous is a moderate penalty
        let total = (temporal + reid + cls_score + bbox) * dir_compat;
        if total < self.weights.video_track_match_threshold {
            return None;
        }

        Some(Candidate {
            score: total,
            upsert: LinkUpsert {
                track_a_id: ta.id,
                track_b_id: tb.id,
                entity_type: entity_type.to_string(),
                match_confidence: total,
                match_method: determine_method(reid_sim, temporal, cls_match),
                reid_similarity: reid_sim,
                temporal_gap_seconds: Some(endpoint_gap(&span_a, &span_b)),
                classification_match: cls_match,
                lane_distance: None,
                crossing_line_id: None,
                status: LinkStatus::Auto,
                source_track_type: SourceTrackType::VideoTrack,
            },
        })
    }

    // ------------------------------------------------------------------
    // Batch runs
    // ------------------------------------------------------------------

    /// Match camera-object tracks for every topology-connected camera pair.
    pub async fn match_all_pairs(&self, entity_type: &str) -> MatchResult<PairSummary> {
        let mut total = PairSummary::default();
        for (cam_a, cam_b) in self.topology.pairs().await? {
            let summary = self.match_cameras(&cam_a, &cam_b, entity_type).await?;
            total.links_created += summary.links_created;
            total.pairs_evaluated += summary.pairs_evaluated;
        }
        Ok(total)
    }

    /// Match video tracks for every topology-connected camera pair.
    pub async fn match_all_video_tracks(&self, entity_type: &str) -> MatchResult<PairSummary> {
        let mut total = PairSummary::default();
        for (cam_a, cam_b) in self.topology.pairs().await? {
            let summary = self.match_video_tracks_cameras(&cam_a, &cam_b, entity_type).await?;
            total.links_created += summary.links_created;
            total.pairs_evaluated += summary.pairs_evaluated;
            total.direction_vetoed += summary.direction_vetoed;
        }
        Ok(total)
    }

    /// Record an accepted pair, unless it is excluded or already rejected by
    /// a reviewer.
    async fn create_link(&self, candidate: Candidate) -> MatchResult<Option<i64>> {
        let pair = revid_models::CrossCameraLink::normalize_pair(
            candidate.upsert.track_a_id,
            candidate.upsert.track_b_id,
        );
        if self.exclude_pairs.contains(&pair) {
            debug!(?pair, "Pair already matched spatially, skipping ReID link");
            return Ok(None);
        }
        if self.store.rejected_pairs().await?.contains(&pair) {
            debug!(?pair, "Pair rejected by reviewer, skipping");
            return Ok(None);
        }
        let link = self.store.upsert_link(candidate.upsert).await?;
        Ok(Some(link.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(a: TrackId, b: TrackId, score: f64) -> (TrackId, TrackId, Candidate) {
        (
            a,
            b,
            Candidate {
                score,
                upsert: LinkUpsert {
                    track_a_id: a,
                    track_b_id: b,
                    entity_type: "vehicle".into(),
                    match_confidence: score,
                    match_method: "temporal".into(),
                    reid_similarity: None,
                    temporal_gap_seconds: None,
                    classification_match: None,
                    lane_distance: None,
                    crossing_line_id: None,
                    status: LinkStatus::Auto,
                    source_track_type: SourceTrackType::VideoTrack,
                },
            },
        )
    }

    #[test]
    fn test_mutual_best_requires_agreement() {
        // a1's best is b1; b1's best is a2: no link for a1
        let accepted = mutual_best(vec![
            candidate(1, 10, 0.7),
            candidate(2, 10, 0.9),
            candidate(2, 11, 0.5),
        ]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].upsert.track_a_id, 2);
        assert_eq!(accepted[0].upsert.track_b_id, 10);
    }

    #[test]
    fn test_mutual_best_no_shared_tracks() {
        let accepted = mutual_best(vec![
            candidate(1, 10, 0.9),
            candidate(2, 11, 0.8),
            candidate(1, 11, 0.4),
        ]);
        assert_eq!(accepted.len(), 2);
        let mut ids = HashSet::new();
        for c in &accepted {
            assert!(ids.insert(c.upsert.track_a_id));
            assert!(ids.insert(c.upsert.track_b_id));
        }
    }

    #[test]
    fn test_topology_direction_match() {
        // One-way edge A->B: A-first is expected
        assert_eq!(
            ReidTrackMatcher::topology_direction_match(true, false, 100.0, 105.0),
            Some(true)
        );
        assert_eq!(
            ReidTrackMatcher::topology_direction_match(true, false, 105.0, 100.0),
            Some(false)
        );
        // Bidirectional: no hint
        assert_eq!(
            ReidTrackMatcher::topology_direction_match(true, true, 100.0, 105.0),
            None
        );
    }
}
