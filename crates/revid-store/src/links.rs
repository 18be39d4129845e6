//! Cross-camera link repository.

use chrono::Utc;
use revid_models::{CrossCameraLink, CrossingLineId, LinkId, LinkStatus, SourceTrackType, TrackId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

/// Fields a matcher supplies when recording a link.
#[derive(Debug, Clone)]
pub struct LinkUpsert {
    pub track_a_id: TrackId,
    pub track_b_id: TrackId,
    pub entity_type: String,
    pub match_confidence: f64,
    pub match_method: String,
    pub reid_similarity: Option<f64>,
    pub temporal_gap_seconds: Option<f64>,
    pub classification_match: Option<bool>,
    pub lane_distance: Option<f64>,
    pub crossing_line_id: Option<CrossingLineId>,
    pub status: LinkStatus,
    pub source_track_type: SourceTrackType,
}

impl Store {
    /// Insert or update the link for an unordered pair.
    ///
    /// The pair is normalized (smaller id first) and at most one link exists
    /// per pair. On update, the stored confidence keeps the larger value and
    /// human-reviewed statuses are never overwritten.
    pub async fn upsert_link(&self, upsert: LinkUpsert) -> StoreResult<CrossCameraLink> {
        if upsert.track_a_id == upsert.track_b_id {
            return Err(StoreError::bad_input("cannot link a track to itself"));
        }
        let (a, b) = CrossCameraLink::normalize_pair(upsert.track_a_id, upsert.track_b_id);

        let mut state = self.state.write().await;

        if let Some(&link_id) = state.link_pairs.get(&(a, b)) {
            let link = state
                .links
                .get_mut(&link_id)
                .ok_or_else(|| StoreError::Internal(format!("dangling link pair ({a},{b})")))?;
            link.match_confidence = link.match_confidence.max(upsert.match_confidence);
            link.match_method = upsert.match_method;
            if upsert.reid_similarity.is_some() {
                link.reid_similarity = upsert.reid_similarity;
            }
            link.temporal_gap_seconds = upsert.temporal_gap_seconds;
            link.classification_match = upsert.classification_match;
            if upsert.lane_distance.is_some() {
                link.lane_distance = upsert.lane_distance;
            }
            if upsert.crossing_line_id.is_some() {
                link.crossing_line_id = upsert.crossing_line_id;
            }
            link.source_track_type = upsert.source_track_type;
            if !link.status.is_reviewed() {
                link.status = upsert.status;
            }
            debug!(link_id, a, b, "Updated existing cross-camera link");
            return Ok(link.clone());
        }

        let id = alloc(&mut state.next_link_id);
        let link = CrossCameraLink {
            id,
            track_a_id: a,
            track_b_id: b,
            entity_type: upsert.entity_type,
            match_confidence: upsert.match_confidence,
            match_method: upsert.match_method,
            reid_similarity: upsert.reid_similarity,
            temporal_gap_seconds: upsert.temporal_gap_seconds,
            classification_match: upsert.classification_match,
            lane_distance: upsert.lane_distance,
            crossing_line_id: upsert.crossing_line_id,
            status: upsert.status,
            source_track_type: upsert.source_track_type,
            confirmed_by: None,
            rejection_reason: None,
            created_at: Utc::now(),
        };
        state.links.insert(id, link.clone());
        state.link_pairs.insert((a, b), id);
        Ok(link)
    }

    /// Fetch a link by id.
    pub async fn get_link(&self, id: LinkId) -> StoreResult<CrossCameraLink> {
        let state = self.state.read().await;
        state
            .links
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("cross_camera_link", id))
    }

    /// Non-rejected links of one source type, for identity resolution.
    pub async fn list_effective_links(
        &self,
        source_track_type: SourceTrackType,
    ) -> StoreResult<Vec<CrossCameraLink>> {
        let state = self.state.read().await;
        let mut out: Vec<CrossCameraLink> = state
            .links
            .values()
            .filter(|l| l.is_effective() && l.source_track_type == source_track_type)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.id);
        Ok(out)
    }

    /// All links, ordered by confidence descending.
    pub async fn list_links(&self, status: Option<LinkStatus>) -> StoreResult<Vec<CrossCameraLink>> {
        let state = self.state.read().await;
        let mut out: Vec<CrossCameraLink> = state
            .links
            .values()
            .filter(|l| status.is_none_or(|s| l.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.match_confidence.total_cmp(&a.match_confidence));
        Ok(out)
    }

    /// Confirm or reject a link. Matchers re-resolve identities afterwards.
    pub async fn set_link_status(
        &self,
        id: LinkId,
        status: LinkStatus,
        confirmed_by: Option<&str>,
        rejection_reason: Option<&str>,
    ) -> StoreResult<CrossCameraLink> {
        let mut state = self.state.write().await;
        let link = state
            .links
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("cross_camera_link", id))?;
        link.status = status;
        link.confirmed_by = confirmed_by.map(String::from);
        link.rejection_reason = rejection_reason.map(String::from);
        Ok(link.clone())
    }

    /// Normalized (a, b) pairs a reviewer rejected. Matchers skip these so
    /// the tracks can find different partners.
    pub async fn rejected_pairs(&self) -> StoreResult<std::collections::HashSet<(TrackId, TrackId)>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .values()
            .filter(|l| l.status == LinkStatus::Rejected)
            .map(|l| (l.track_a_id, l.track_b_id))
            .collect())
    }

    /// Track ids settled by a confirmed link; matchers exclude them.
    pub async fn confirmed_track_ids(&self) -> StoreResult<std::collections::HashSet<TrackId>> {
        let state = self.state.read().await;
        let mut out = std::collections::HashSet::new();
        for link in state.links.values() {
            if link.status == LinkStatus::Confirmed {
                out.insert(link.track_a_id);
                out.insert(link.track_b_id);
            }
        }
        Ok(out)
    }
}
