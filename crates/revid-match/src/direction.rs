//! Direction-based cross-camera matcher.
//!
//! On a two-lane road, travel direction determines the lane: positive dx one
//! way, negative dx the other. Tracks are bucketed by direction sign and only
//! matched within a bucket. Cameras may physically face opposite directions,
//! so both same-facing and opposite-facing pairings are tried and the one
//! producing more (and better) matches wins. Tracks without a usable
//! direction run in a separate pass split by temporal order.

use std::collections::HashSet;
use std::sync::Arc;

use revid_models::{
    direction_from_path, CameraObjectTrack, ClassTaxonomy, CrossCameraLink, LinkStatus,
    MatchWeights, SourceTrackType, TopologyEdge, TrackId,
};
use revid_ml_client::types::cosine_similarity;
use revid_store::{LinkUpsert, Store};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::descriptors::{histogram_correlation, DescriptorCache};
use crate::error::MatchResult;
use crate::scoring::{reid_tier_direction, size_ratio_score};
use crate::topology::TopologyCache;

/// Direction bucket a pairing round runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    /// Both tracks move with positive dx
    Positive,
    /// Both tracks move with negative dx
    Negative,
    /// Unknown directions, camera A's track must appear first
    UnknownAFirst,
    /// Unknown directions, camera B's track must appear first
    UnknownBFirst,
}

/// Score breakdown for an accepted pair.
#[derive(Debug, Clone)]
pub struct DirectionScore {
    pub total: f64,
    pub temporal_score: f64,
    pub reid_score: f64,
    pub color_score: f64,
    pub size_score: f64,
    pub reid_similarity: Option<f64>,
    pub temporal_gap: f64,
}

/// One accepted match.
#[derive(Debug, Clone)]
pub struct DirectionMatch {
    pub track_a_id: TrackId,
    pub track_b_id: TrackId,
    pub score: DirectionScore,
}

/// Summary of a full direction-matching run.
#[derive(Debug, Clone, Default)]
pub struct DirectionRunSummary {
    pub links_created: usize,
    pub camera_pairs: usize,
    /// Normalized pairs linked in this run; the ReID pass excludes them
    pub matched_pairs: Vec<(TrackId, TrackId)>,
}

/// A track with its precomputed motion evidence.
struct DirTrack {
    track: CameraObjectTrack,
    /// Normalized (dx, dy) travel direction, when reliable
    direction: Option<(f64, f64)>,
    /// (start, mid, end) epoch times from upstream path data
    path_times: Option<(f64, f64, f64)>,
    /// Color histogram of the anchor crop
    histogram: Option<Vec<f32>>,
}

/// Direction and path timestamps for a camera-object track.
///
/// Direction sources, in order: upstream path data from a member's video
/// (sub-second accurate), then multi-member bbox centroid movement.
pub(crate) async fn track_motion_sources(
    store: &Store,
    track: &CameraObjectTrack,
) -> MatchResult<(Option<(f64, f64)>, Option<(f64, f64, f64)>)> {
    let members = store.list_track_members(track.id).await?;

    let mut direction = None;
    let mut path_times = None;
    for member in &members {
        let Ok(video) = store.get_video(member.video_id).await else {
            continue;
        };
        if let Some(path) = &video.metadata.path_data {
            path_times = video.metadata.path_times();
            direction = direction_from_path(path, video.width as f64, video.height as f64);
            break;
        }
    }

    if direction.is_some() {
        return Ok((direction, path_times));
    }

    // Fallback: bbox centroid movement across members
    if members.len() >= 2 {
        let first = &members[0];
        let last = &members[members.len() - 1];
        if let (Some(a), Some(b)) = (first.bbox, last.bbox) {
            let (ax, ay) = a.center();
            let (bx, by) = b.center();
            let dx = bx - ax;
            let dy = by - ay;
            let length = (dx * dx + dy * dy).sqrt();
            let min_displacement = revid_models::motion::MIN_DISPLACEMENT_FRAC
                * (1920.0f64.powi(2) + 1080.0f64.powi(2)).sqrt();
            if length >= min_displacement {
                direction = Some((dx / length, dy / length));
            }
        }
    }

    Ok((direction, path_times))
}

/// The direction-based matcher.
pub struct DirectionMatcher {
    store: Store,
    topology: Arc<TopologyCache>,
    weights: MatchWeights,
    taxonomy: ClassTaxonomy,
    descriptors: Mutex<DescriptorCache>,
}

impl DirectionMatcher {
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
            descriptors: Mutex::new(DescriptorCache::new(512)),
        }
    }

    /// Match one camera pair. Returns the accepted matches without creating
    /// links; [`DirectionMatcher::match_all`] persists them.
    pub async fn match_camera_pair(
        &self,
        camera_a: &str,
        camera_b: &str,
        entity_type: &str,
    ) -> MatchResult<Vec<DirectionMatch>> {
        let Some((edge, _bidirectional)) = self.topology.get_pair(camera_a, camera_b).await? else {
            debug!(camera_a, camera_b, "No topology between cameras");
            return Ok(Vec::new());
        };

        let scenario = format!("{entity_type}_detection");
        let tracks_a = self.store.list_approved_tracks(camera_a, &scenario).await?;
        let tracks_b = self.store.list_approved_tracks(camera_b, &scenario).await?;
        if tracks_a.is_empty() || tracks_b.is_empty() {
            return Ok(Vec::new());
        }

        // Stationary filter: a track observed for far longer than the
        // transit time is parked, not transiting
        let max_span = 60.0_f64.max(edge.max_transit_seconds * 4.0);
        let confirmed = self.store.confirmed_track_ids().await?;
        let rejected = self.store.rejected_pairs().await?;

        let mut dir_a = Vec::new();
        for t in tracks_a {
            if t.span_seconds() > max_span || confirmed.contains(&t.id) {
                continue;
            }
            dir_a.push(self.prepare(t).await?);
        }
        let mut dir_b = Vec::new();
        for t in tracks_b {
            if t.span_seconds() > max_span || confirmed.contains(&t.id) {
                continue;
            }
            dir_b.push(self.prepare(t).await?);
        }
        if dir_a.is_empty() || dir_b.is_empty() {
            return Ok(Vec::new());
        }

        let bucket_of = |d: &Option<(f64, f64)>| -> Option<Bucket> {
            d.map(|(dx, _)| if dx > 0.0 { Bucket::Positive } else { Bucket::Negative })
        };

        let pos_a: Vec<&DirTrack> = dir_a.iter().filter(|t| bucket_of(&t.direction) == Some(Bucket::Positive)).collect();
        let neg_a: Vec<&DirTrack> = dir_a.iter().filter(|t| bucket_of(&t.direction) == Some(Bucket::Negative)).collect();
        let unk_a: Vec<&DirTrack> = dir_a.iter().filter(|t| t.direction.is_none()).collect();
        let pos_b: Vec<&DirTrack> = dir_b.iter().filter(|t| bucket_of(&t.direction) == Some(Bucket::Positive)).collect();
        let neg_b: Vec<&DirTrack> = dir_b.iter().filter(|t| bucket_of(&t.direction) == Some(Bucket::Negative)).collect();
        let unk_b: Vec<&DirTrack> = dir_b.iter().filter(|t| t.direction.is_none()).collect();

        info!(
            camera_a, camera_b,
            a_pos = pos_a.len(), a_neg = neg_a.len(), a_unknown = unk_a.len(),
            b_pos = pos_b.len(), b_neg = neg_b.len(), b_unknown = unk_b.len(),
            "Direction groups"
        );

        // Same-facing pairing: positive<->positive, negative<->negative
        let mut same_facing = self.mutual_best(&pos_a, &pos_b, &edge, Bucket::Positive, &rejected).await;
        same_facing.extend(self.mutual_best(&neg_a, &neg_b, &edge, Bucket::Negative, &rejected).await);

        // Opposite-facing pairing: positive<->negative both ways
        let mut opposite_facing = self.mutual_best(&pos_a, &neg_b, &edge, Bucket::Positive, &rejected).await;
        opposite_facing.extend(self.mutual_best(&neg_a, &pos_b, &edge, Bucket::Negative, &rejected).await);

        let quality = |matches: &[DirectionMatch]| -> (usize, f64) {
            if matches.is_empty() {
                return (0, 0.0);
            }
            let avg = matches.iter().map(|m| m.score.total).sum::<f64>() / matches.len() as f64;
            (matches.len(), avg)
        };
        let same_q = quality(&same_facing);
        let opp_q = quality(&opposite_facing);

        let (mut all_matches, facing) = if opp_q > same_q {
            (opposite_facing, "opposite")
        } else {
            (same_facing, "same")
        };
        info!(
            camera_a, camera_b,
            matches = all_matches.len(),
            facing,
            same = same_q.0,
            opposite = opp_q.0,
            "Directional rounds complete"
        );

        // Unknown-direction rounds, split by temporal order so vehicles in
        // opposite lanes cannot cross-match
        let mut matched_a: HashSet<TrackId> = all_matches.iter().map(|m| m.track_a_id).collect();
        let mut matched_b: HashSet<TrackId> = all_matches.iter().map(|m| m.track_b_id).collect();

        for bucket in [Bucket::UnknownAFirst, Bucket::UnknownBFirst] {
            let ua: Vec<&DirTrack> = unk_a.iter().copied().filter(|t| !matched_a.contains(&t.track.id)).collect();
            let ub: Vec<&DirTrack> = dir_b.iter().filter(|t| !matched_b.contains(&t.track.id)).collect();
            if !ua.is_empty() && !ub.is_empty() {
                let matches = self.mutual_best(&ua, &ub, &edge, bucket, &rejected).await;
                for m in &matches {
                    matched_a.insert(m.track_a_id);
                    matched_b.insert(m.track_b_id);
                }
                all_matches.extend(matches);
            }
        }
        // Remaining unknown-direction B tracks against remaining A tracks
        for bucket in [Bucket::UnknownAFirst, Bucket::UnknownBFirst] {
            let ua: Vec<&DirTrack> = dir_a.iter().filter(|t| !matched_a.contains(&t.track.id)).collect();
            let ub: Vec<&DirTrack> = unk_b.iter().copied().filter(|t| !matched_b.contains(&t.track.id)).collect();
            if !ua.is_empty() && !ub.is_empty() {
                let matches = self.mutual_best(&ua, &ub, &edge, bucket, &rejected).await;
                for m in &matches {
                    matched_a.insert(m.track_a_id);
                    matched_b.insert(m.track_b_id);
                }
                all_matches.extend(matches);
            }
        }

        Ok(all_matches)
    }

    /// Run direction matching across every topology-connected camera pair
    /// and persist the accepted links.
    pub async fn match_all(&self, entity_type: &str) -> MatchResult<DirectionRunSummary> {
        let mut summary = DirectionRunSummary::default();
        for (cam_a, cam_b) in self.topology.pairs().await? {
            let matches = self.match_camera_pair(&cam_a, &cam_b, entity_type).await?;
            for m in &matches {
                self.create_link(m, entity_type).await?;
                summary.links_created += 1;
                summary
                    .matched_pairs
                    .push(CrossCameraLink::normalize_pair(m.track_a_id, m.track_b_id));
            }
            summary.camera_pairs += 1;
        }
        info!(
            links = summary.links_created,
            camera_pairs = summary.camera_pairs,
            "Direction-based matching complete"
        );
        Ok(summary)
    }

    /// Load motion evidence and descriptors for one track.
    async fn prepare(&self, track: CameraObjectTrack) -> MatchResult<DirTrack> {
        let (direction, path_times) = track_motion_sources(&self.store, &track).await?;
        let histogram = {
            let mut cache = self.descriptors.lock().await;
            cache.histogram(track.id, track.anchor_crop_path.as_deref())
        };
        Ok(DirTrack {
            track,
            direction,
            path_times,
            histogram,
        })
    }

    /// Mutual best-match within one bucket, skipping reviewer-rejected pairs.
    async fn mutual_best(
        &self,
        tracks_a: &[&DirTrack],
        tracks_b: &[&DirTrack],
        edge: &TopologyEdge,
        bucket: Bucket,
        rejected: &HashSet<(TrackId, TrackId)>,
    ) -> Vec<DirectionMatch> {
        let mut best_for_a: std::collections::HashMap<TrackId, (f64, TrackId, DirectionScore)> =
            std::collections::HashMap::new();
        let mut best_for_b: std::collections::HashMap<TrackId, (f64, TrackId)> =
            std::collections::HashMap::new();

        for ta in tracks_a {
            for tb in tracks_b {
                let pair = CrossCameraLink::normalize_pair(ta.track.id, tb.track.id);
                if rejected.contains(&pair) {
                    continue;
                }
                let Some(score) = self.score_pair(ta, tb, edge, bucket) else {
                    continue;
                };
                if score.total < self.weights.direction.match_threshold {
                    continue;
                }

                let total = score.total;
                if best_for_a
                    .get(&ta.track.id)
                    .is_none_or(|(s, _, _)| total > *s)
                {
                    best_for_a.insert(ta.track.id, (total, tb.track.id, score.clone()));
                }
                if best_for_b.get(&tb.track.id).is_none_or(|(s, _)| total > *s) {
                    best_for_b.insert(tb.track.id, (total, ta.track.id));
                }
            }
        }

        let mut matches = Vec::new();
        for (a_id, (_, b_id, score)) in best_for_a {
            if best_for_b.get(&b_id).is_some_and(|(_, back)| *back == a_id) {
                matches.push(DirectionMatch {
                    track_a_id: a_id,
                    track_b_id: b_id,
                    score,
                });
            }
        }
        matches
    }

    /// Score a candidate pair within a direction bucket.
    fn score_pair(
        &self,
        ta: &DirTrack,
        tb: &DirTrack,
        edge: &TopologyEdge,
        bucket: Bucket,
    ) -> Option<DirectionScore> {
        let w = &self.weights.direction;

        // Hard veto: conflicting classifications (compat groups absorb the
        // detector's distance confusions)
        if self
            .taxonomy
            .are_compatible(ta.track.vehicle_subtype(), tb.track.vehicle_subtype())
            == Some(false)
        {
            return None;
        }

        // Temporal gap, preferring path-data midpoints (sub-second accurate
        // where first_seen is often batch-rounded)
        let signed_gap = match (ta.path_times, tb.path_times) {
            (Some(pa), Some(pb)) => pb.1 - pa.1,
            _ => tb.track.first_seen - ta.track.first_seen,
        };
        let gap = signed_gap.abs();

        // Unknown-direction rounds enforce temporal order so the two road
        // directions cannot cross-match
        match bucket {
            Bucket::UnknownAFirst if signed_gap < 0.0 => return None,
            Bucket::UnknownBFirst if signed_gap > 0.0 => return None,
            _ => {}
        }

        if gap > edge.max_transit_seconds {
            return None;
        }

        // Continuous linear decay over the transit window
        let temporal_score = w.temporal * (1.0 - gap / edge.max_transit_seconds).max(0.0);

        // ReID: cross-camera tier mapping, full weight from 0.65 up
        let reid_similarity = match (&ta.track.reid_embedding, &tb.track.reid_embedding) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b) as f64),
            _ => None,
        };
        let reid_score = reid_similarity
            .map(|sim| reid_tier_direction(sim, w.reid))
            .unwrap_or(0.0);

        // Color histogram correlation, clipped at zero
        let color_score = match (&ta.histogram, &tb.histogram) {
            (Some(a), Some(b)) => w.color * (histogram_correlation(a, b) as f64).max(0.0),
            _ => 0.0,
        };

        let size_score = size_ratio_score(
            ta.track.avg_area(),
            tb.track.avg_area(),
            w.size,
            self.weights.min_size_ratio,
        );

        let total = temporal_score + reid_score + color_score + size_score;

        Some(DirectionScore {
            total,
            temporal_score,
            reid_score,
            color_score,
            size_score,
            reid_similarity,
            temporal_gap: gap,
        })
    }

    /// Record one accepted match as a link.
    async fn create_link(&self, m: &DirectionMatch, entity_type: &str) -> MatchResult<()> {
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
                match_method: "direction".to_string(),
                reid_similarity: m.score.reid_similarity,
                temporal_gap_seconds: Some(m.score.temporal_gap),
                classification_match: None,
                lane_distance: None,
                crossing_line_id: None,
                status,
                source_track_type: SourceTrackType::CameraObject,
            })
            .await?;
        Ok(())
    }
}
