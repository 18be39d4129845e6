//! Video track repository.

use revid_models::{TrackId, TrajectoryPoint, VideoId, VideoTrack, VideoTrackId, VideoTrackStatus};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

/// Fields for inserting a video track. The store assigns the id and derives
/// the aggregate columns from the trajectory.
#[derive(Debug, Clone)]
pub struct NewVideoTrack {
    pub video_id: VideoId,
    pub camera_id: String,
    pub tracker_track_id: u32,
    pub class_name: String,
    pub trajectory: Vec<TrajectoryPoint>,
    pub first_seen_epoch: f64,
    pub last_seen_epoch: f64,
    pub best_crop_path: Option<String>,
    pub reid_embedding: Option<Vec<f32>>,
}

impl Store {
    /// Insert a video track. The trajectory must be non-empty with
    /// monotonically non-decreasing timestamps.
    pub async fn insert_video_track(&self, new: NewVideoTrack) -> StoreResult<VideoTrack> {
        if new.trajectory.is_empty() {
            return Err(StoreError::bad_input("video track trajectory is empty"));
        }
        if new
            .trajectory
            .windows(2)
            .any(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(StoreError::bad_input(
                "video track trajectory timestamps must be non-decreasing",
            ));
        }

        let mut state = self.state.write().await;
        if !state.videos.contains_key(&new.video_id) {
            return Err(StoreError::not_found("video", new.video_id));
        }

        let id = alloc(&mut state.next_video_track_id);
        let mut track = VideoTrack {
            id,
            video_id: new.video_id,
            camera_id: new.camera_id,
            tracker_track_id: new.tracker_track_id,
            class_name: new.class_name,
            trajectory: new.trajectory,
            first_seen_epoch: new.first_seen_epoch,
            last_seen_epoch: new.last_seen_epoch,
            best_crop_path: new.best_crop_path,
            avg_confidence: 0.0,
            avg_bbox_width: 0.0,
            avg_bbox_height: 0.0,
            reid_embedding: new.reid_embedding,
            status: VideoTrackStatus::Active,
            cross_camera_identity_id: None,
        };
        track.refresh_aggregates();
        state.video_tracks.insert(id, track.clone());
        Ok(track)
    }

    /// Fetch a video track by id.
    pub async fn get_video_track(&self, id: VideoTrackId) -> StoreResult<VideoTrack> {
        let state = self.state.read().await;
        state
            .video_tracks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("video_track", id))
    }

    /// All tracks for a video, any status.
    pub async fn list_video_tracks(&self, video_id: VideoId) -> StoreResult<Vec<VideoTrack>> {
        let state = self.state.read().await;
        let mut out: Vec<VideoTrack> = state
            .video_tracks
            .values()
            .filter(|t| t.video_id == video_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.id);
        Ok(out)
    }

    /// Active tracks for a video.
    pub async fn list_active_video_tracks(&self, video_id: VideoId) -> StoreResult<Vec<VideoTrack>> {
        let state = self.state.read().await;
        let mut out: Vec<VideoTrack> = state
            .video_tracks
            .values()
            .filter(|t| t.video_id == video_id && t.status == VideoTrackStatus::Active)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.id);
        Ok(out)
    }

    /// Active tracks for a camera across all videos, ordered by
    /// first_seen_epoch. Used by the cross-camera matchers.
    pub async fn list_active_video_tracks_for_camera(
        &self,
        camera_id: &str,
    ) -> StoreResult<Vec<VideoTrack>> {
        let state = self.state.read().await;
        let mut out: Vec<VideoTrack> = state
            .video_tracks
            .values()
            .filter(|t| t.camera_id == camera_id && t.status == VideoTrackStatus::Active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.first_seen_epoch.total_cmp(&b.first_seen_epoch));
        Ok(out)
    }

    /// Deactivate tracks (merge or jump-fragmentation). Deactivated tracks
    /// remain for audit but leave the active matching set.
    pub async fn set_video_track_status(
        &self,
        ids: &[VideoTrackId],
        status: VideoTrackStatus,
    ) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(track) = state.video_tracks.get_mut(id) {
                track.status = status;
                updated += 1;
            }
        }
        if updated > 0 && status != VideoTrackStatus::Active {
            info!(count = updated, status = status.as_str(), "Deactivated video tracks");
        }
        Ok(updated)
    }

    /// Replace a track's trajectory (jump cleaning) and refresh aggregates.
    pub async fn update_video_track_trajectory(
        &self,
        id: VideoTrackId,
        trajectory: Vec<TrajectoryPoint>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let track = state
            .video_tracks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("video_track", id))?;
        track.trajectory = trajectory;
        track.refresh_aggregates();
        Ok(())
    }

    /// Attach a ReID embedding to a track.
    pub async fn set_video_track_embedding(
        &self,
        id: VideoTrackId,
        embedding: Vec<f32>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let track = state
            .video_tracks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("video_track", id))?;
        track.reid_embedding = Some(embedding);
        Ok(())
    }

    /// Clear identity ids on all video tracks.
    pub async fn reset_video_track_identities(&self) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for track in state.video_tracks.values_mut() {
            track.cross_camera_identity_id = None;
        }
        Ok(())
    }

    /// Assign one identity id to a set of video tracks.
    pub async fn set_video_track_identities(
        &self,
        ids: &[VideoTrackId],
        identity: TrackId,
    ) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(track) = state.video_tracks.get_mut(id) {
                track.cross_camera_identity_id = Some(identity);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
