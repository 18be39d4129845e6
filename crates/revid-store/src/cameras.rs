//! Camera repository. Static config, mutated only by the operator.

use revid_models::Camera;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

impl Store {
    /// Insert or replace a camera.
    pub async fn upsert_camera(&self, camera: Camera) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.cameras.insert(camera.camera_id.clone(), camera);
        Ok(())
    }

    /// Fetch a camera by id.
    pub async fn get_camera(&self, camera_id: &str) -> StoreResult<Camera> {
        let state = self.state.read().await;
        state
            .cameras
            .get(camera_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("camera", camera_id))
    }

    /// List all cameras.
    pub async fn list_cameras(&self) -> StoreResult<Vec<Camera>> {
        let state = self.state.read().await;
        let mut cameras: Vec<Camera> = state.cameras.values().cloned().collect();
        cameras.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        Ok(cameras)
    }
}
