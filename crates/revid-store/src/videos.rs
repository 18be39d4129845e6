//! Video repository.

use chrono::Utc;
use revid_models::{Video, VideoId, VideoMetadata};

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

impl Store {
    /// Insert a new video record.
    pub async fn insert_video(
        &self,
        camera_id: impl Into<String>,
        filename: impl Into<String>,
        width: u32,
        height: u32,
        metadata: VideoMetadata,
    ) -> StoreResult<Video> {
        let mut state = self.state.write().await;
        let id = alloc(&mut state.next_video_id);
        let video = Video {
            id,
            camera_id: camera_id.into(),
            filename: filename.into(),
            width,
            height,
            metadata,
            created_at: Utc::now(),
        };
        state.videos.insert(id, video.clone());
        Ok(video)
    }

    /// Fetch a video by id.
    pub async fn get_video(&self, id: VideoId) -> StoreResult<Video> {
        let state = self.state.read().await;
        state
            .videos
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("video", id))
    }

    /// Find a video by its filename.
    pub async fn find_video_by_filename(&self, filename: &str) -> StoreResult<Option<Video>> {
        let state = self.state.read().await;
        Ok(state.videos.values().find(|v| v.filename == filename).cloned())
    }

    /// Augment a video's metadata. The body of a video is immutable.
    pub async fn update_video_metadata(&self, id: VideoId, metadata: VideoMetadata) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let video = state
            .videos
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("video", id))?;
        video.metadata = metadata;
        Ok(())
    }
}
