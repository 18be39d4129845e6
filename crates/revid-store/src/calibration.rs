//! PTZ calibration point repository.

use chrono::Utc;
use revid_models::PtzCalibrationPoint;

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

impl Store {
    /// Save a confirmed calibration reference point.
    pub async fn insert_calibration_point(
        &self,
        mut point: PtzCalibrationPoint,
    ) -> StoreResult<PtzCalibrationPoint> {
        let mut state = self.state.write().await;
        point.id = alloc(&mut state.next_calibration_id);
        point.created_at = Utc::now();
        state.calibration_points.insert(point.id, point.clone());
        Ok(point)
    }

    /// Calibration points for a (source, target) camera pair, oldest first.
    pub async fn list_calibration_points(
        &self,
        source_camera_id: &str,
        target_camera_id: &str,
    ) -> StoreResult<Vec<PtzCalibrationPoint>> {
        let state = self.state.read().await;
        let mut out: Vec<PtzCalibrationPoint> = state
            .calibration_points
            .values()
            .filter(|p| {
                p.source_camera_id == source_camera_id && p.target_camera_id == target_camera_id
            })
            .cloned()
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    /// Delete one calibration point.
    pub async fn delete_calibration_point(&self, id: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .calibration_points
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("ptz_calibration_point", id))
    }
}
