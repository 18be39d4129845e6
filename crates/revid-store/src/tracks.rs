//! Camera object track repository.

use revid_models::{
    AnchorClassification, AnchorStatus, CameraObjectTrack, GroupId, TrackId,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

impl Store {
    /// Create a camera object track.
    pub async fn create_track(
        &self,
        camera_id: &str,
        scenario: &str,
        source_group_id: Option<GroupId>,
    ) -> StoreResult<CameraObjectTrack> {
        let mut state = self.state.write().await;
        let id = alloc(&mut state.next_track_id);
        let track = CameraObjectTrack {
            id,
            camera_id: camera_id.to_string(),
            scenario: scenario.to_string(),
            member_count: 0,
            bbox_centroid_x: 0.0,
            bbox_centroid_y: 0.0,
            avg_bbox_width: 0.0,
            avg_bbox_height: 0.0,
            anchor_status: AnchorStatus::Pending,
            anchor_classification: AnchorClassification::default(),
            first_seen: 0.0,
            last_seen: 0.0,
            cross_camera_identity_id: None,
            cross_camera_conflict: false,
            source_group_id,
            anchor_crop_path: None,
            reid_embedding: None,
        };
        state.tracks.insert(id, track.clone());
        Ok(track)
    }

    /// Fetch a track by id.
    pub async fn get_track(&self, id: TrackId) -> StoreResult<CameraObjectTrack> {
        let state = self.state.read().await;
        state
            .tracks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("camera_object_track", id))
    }

    /// All tracks for a camera + scenario, ordered by first_seen.
    pub async fn list_tracks(&self, camera_id: &str, scenario: &str) -> StoreResult<Vec<CameraObjectTrack>> {
        let state = self.state.read().await;
        let mut out: Vec<CameraObjectTrack> = state
            .tracks
            .values()
            .filter(|t| t.camera_id == camera_id && t.scenario == scenario)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.first_seen.total_cmp(&b.first_seen));
        Ok(out)
    }

    /// Tracks eligible for cross-camera matching: anchor approved (or in
    /// conflict, which implies some approvals) with a known first_seen.
    pub async fn list_approved_tracks(
        &self,
        camera_id: &str,
        scenario: &str,
    ) -> StoreResult<Vec<CameraObjectTrack>> {
        let state = self.state.read().await;
        let mut out: Vec<CameraObjectTrack> = state
            .tracks
            .values()
            .filter(|t| {
                t.camera_id == camera_id
                    && t.scenario == scenario
                    && matches!(t.anchor_status, AnchorStatus::Approved | AnchorStatus::Conflict)
                    && t.first_seen > 0.0
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.first_seen.total_cmp(&b.first_seen));
        Ok(out)
    }

    /// Set a track's anchor status.
    pub async fn set_track_anchor_status(&self, id: TrackId, status: AnchorStatus) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let track = state
            .tracks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("camera_object_track", id))?;
        track.anchor_status = status;
        Ok(())
    }

    /// Set a track's anchor classification.
    pub async fn set_track_classification(
        &self,
        id: TrackId,
        classification: AnchorClassification,
        conflict: bool,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let track = state
            .tracks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("camera_object_track", id))?;
        track.anchor_classification = classification;
        track.cross_camera_conflict = conflict;
        Ok(())
    }

    /// Flag a track whose human label disagrees with identity-majority vote.
    pub async fn set_track_cross_camera_conflict(&self, id: TrackId, conflict: bool) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let track = state
            .tracks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("camera_object_track", id))?;
        track.cross_camera_conflict = conflict;
        Ok(())
    }

    /// Recompute a track's aggregates from its member predictions.
    ///
    /// Within one recompute cycle: `member_count` equals the number of
    /// members, `first_seen <= last_seen`, and the average bbox is the mean
    /// of member bboxes.
    pub async fn recompute_track_stats(&self, track_id: TrackId) -> StoreResult<CameraObjectTrack> {
        let mut state = self.state.write().await;

        let member_rows: Vec<_> = state
            .predictions
            .values()
            .filter(|p| p.camera_object_track_id == Some(track_id))
            .map(|p| (p.bbox, p.timestamp))
            .collect();

        let track = state
            .tracks
            .get_mut(&track_id)
            .ok_or_else(|| StoreError::not_found("camera_object_track", track_id))?;

        track.member_count = member_rows.len() as u32;
        if member_rows.is_empty() {
            return Ok(track.clone());
        }

        let n = member_rows.len() as f64;
        let mut cx = 0.0;
        let mut cy = 0.0;
        let mut w = 0.0;
        let mut h = 0.0;
        for (bbox, _) in &member_rows {
            if let Some(b) = bbox {
                let (bx, by) = b.center();
                cx += bx;
                cy += by;
                w += b.w;
                h += b.h;
            }
        }
        track.bbox_centroid_x = cx / n;
        track.bbox_centroid_y = cy / n;
        track.avg_bbox_width = w / n;
        track.avg_bbox_height = h / n;
        track.first_seen = member_rows.iter().map(|(_, ts)| *ts).fold(f64::INFINITY, f64::min);
        track.last_seen = member_rows
            .iter()
            .map(|(_, ts)| *ts)
            .fold(f64::NEG_INFINITY, f64::max);

        debug!(track_id, members = track.member_count, "Recomputed track stats");
        Ok(track.clone())
    }

    /// Attach appearance descriptors to a track.
    pub async fn set_track_descriptors(
        &self,
        id: TrackId,
        anchor_crop_path: Option<String>,
        reid_embedding: Option<Vec<f32>>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let track = state
            .tracks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("camera_object_track", id))?;
        if anchor_crop_path.is_some() {
            track.anchor_crop_path = anchor_crop_path;
        }
        if reid_embedding.is_some() {
            track.reid_embedding = reid_embedding;
        }
        Ok(())
    }

    /// Delete a camera's tracks and unassign their member predictions.
    /// Used only when the camera's dataset is reset.
    pub async fn clear_tracks_for_camera(&self, camera_id: &str) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let track_ids: Vec<TrackId> = state
            .tracks
            .values()
            .filter(|t| t.camera_id == camera_id)
            .map(|t| t.id)
            .collect();

        for p in state.predictions.values_mut() {
            if let Some(tid) = p.camera_object_track_id {
                if track_ids.contains(&tid) {
                    p.camera_object_track_id = None;
                }
            }
        }
        for tid in &track_ids {
            state.tracks.remove(tid);
        }
        Ok(track_ids.len())
    }

    /// Clear identity ids on all camera object tracks.
    pub async fn reset_track_identities(&self) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for track in state.tracks.values_mut() {
            track.cross_camera_identity_id = None;
        }
        Ok(())
    }

    /// Assign one identity id to a set of tracks.
    pub async fn set_track_identities(&self, ids: &[TrackId], identity: TrackId) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(track) = state.tracks.get_mut(id) {
                track.cross_camera_identity_id = Some(identity);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
