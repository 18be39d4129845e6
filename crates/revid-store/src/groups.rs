//! Prediction group repository.

use chrono::Utc;
use revid_models::{GroupId, PredictionGroup, ReviewStatus};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

impl Store {
    /// Create an empty group seeded with a centroid and average bbox.
    /// Aggregates are recomputed after members are assigned.
    pub async fn create_group(
        &self,
        camera_id: &str,
        scenario: &str,
        bbox_centroid_x: f64,
        bbox_centroid_y: f64,
        avg_bbox_width: f64,
        avg_bbox_height: f64,
    ) -> StoreResult<PredictionGroup> {
        let mut state = self.state.write().await;
        let id = alloc(&mut state.next_group_id);
        let group = PredictionGroup {
            id,
            camera_id: camera_id.to_string(),
            scenario: scenario.to_string(),
            representative_prediction_id: None,
            bbox_centroid_x,
            bbox_centroid_y,
            avg_bbox_width,
            avg_bbox_height,
            member_count: 0,
            min_confidence: 0.0,
            max_confidence: 0.0,
            avg_confidence: 0.0,
            min_timestamp: 0.0,
            max_timestamp: 0.0,
            review_status: ReviewStatus::Pending,
            updated_at: Utc::now(),
        };
        state.groups.insert(id, group.clone());
        Ok(group)
    }

    /// Fetch a group by id.
    pub async fn get_group(&self, id: GroupId) -> StoreResult<PredictionGroup> {
        let state = self.state.read().await;
        state
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("prediction_group", id))
    }

    /// Groups for a camera + scenario with the given review status.
    pub async fn list_groups(
        &self,
        camera_id: &str,
        scenario: &str,
        status: ReviewStatus,
    ) -> StoreResult<Vec<PredictionGroup>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .values()
            .filter(|g| g.camera_id == camera_id && g.scenario == scenario && g.review_status == status)
            .cloned()
            .collect())
    }

    /// Recompute group aggregates from current members: counts, confidence
    /// min/avg/max, timestamp window, centroid, average bbox, and the
    /// representative (largest bbox, ties broken by confidence).
    pub async fn recompute_group_stats(&self, group_id: GroupId) -> StoreResult<PredictionGroup> {
        let mut state = self.state.write().await;

        let members: Vec<_> = state
            .predictions
            .values()
            .filter(|p| p.prediction_group_id == Some(group_id))
            .cloned()
            .collect();

        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::not_found("prediction_group", group_id))?;

        if members.is_empty() {
            group.member_count = 0;
            group.representative_prediction_id = None;
            group.updated_at = Utc::now();
            return Ok(group.clone());
        }

        let n = members.len() as f64;
        let mut cx = 0.0;
        let mut cy = 0.0;
        let mut w = 0.0;
        let mut h = 0.0;
        for m in &members {
            if let Some(b) = m.bbox {
                let (bx, by) = b.center();
                cx += bx;
                cy += by;
                w += b.w;
                h += b.h;
            }
        }

        group.member_count = members.len() as u32;
        group.bbox_centroid_x = cx / n;
        group.bbox_centroid_y = cy / n;
        group.avg_bbox_width = w / n;
        group.avg_bbox_height = h / n;
        group.min_confidence = members.iter().map(|m| m.confidence).fold(f32::INFINITY, f32::min);
        group.max_confidence = members.iter().map(|m| m.confidence).fold(f32::NEG_INFINITY, f32::max);
        group.avg_confidence = members.iter().map(|m| m.confidence).sum::<f32>() / members.len() as f32;
        group.min_timestamp = members.iter().map(|m| m.timestamp).fold(f64::INFINITY, f64::min);
        group.max_timestamp = members
            .iter()
            .map(|m| m.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);

        group.representative_prediction_id = members
            .iter()
            .max_by(|a, b| {
                let area_a = a.bbox.map(|b| b.area()).unwrap_or(0.0);
                let area_b = b.bbox.map(|b| b.area()).unwrap_or(0.0);
                area_a
                    .total_cmp(&area_b)
                    .then(a.confidence.total_cmp(&b.confidence))
            })
            .map(|m| m.id);
        group.updated_at = Utc::now();

        debug!(group_id, members = group.member_count, "Recomputed group stats");
        Ok(group.clone())
    }

    /// Set a group's review status.
    pub async fn set_group_review_status(&self, id: GroupId, status: ReviewStatus) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("prediction_group", id))?;
        group.review_status = status;
        group.updated_at = Utc::now();
        Ok(())
    }

    /// Delete all groups for a camera and unassign their members.
    /// Used by an explicit regroup. Returns the number of groups removed.
    pub async fn clear_groups_for_camera(&self, camera_id: &str) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let group_ids: Vec<GroupId> = state
            .groups
            .values()
            .filter(|g| g.camera_id == camera_id)
            .map(|g| g.id)
            .collect();

        for p in state.predictions.values_mut() {
            if let Some(gid) = p.prediction_group_id {
                if group_ids.contains(&gid) {
                    p.prediction_group_id = None;
                }
            }
        }
        for gid in &group_ids {
            state.groups.remove(gid);
        }
        Ok(group_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictions::NewPrediction;
    use revid_models::{BoundingBox, PredictionTags, PredictionType, VideoMetadata};

    #[tokio::test]
    async fn test_recompute_stats_and_representative() {
        let store = Store::new();
        let video = store
            .insert_video("cam-a", "clip.mp4", 1920, 1080, VideoMetadata::default())
            .await
            .unwrap();

        let small = store
            .insert_prediction(NewPrediction {
                video_id: video.id,
                model_name: "det".into(),
                model_version: "1".into(),
                scenario: "vehicle_detection".into(),
                prediction_type: PredictionType::Keyframe,
                confidence: 0.9,
                timestamp: 1.0,
                end_timestamp: None,
                bbox: Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                predicted_tags: PredictionTags::default(),
                parent_prediction_id: None,
            })
            .await
            .unwrap();
        let large = store
            .insert_prediction(NewPrediction {
                video_id: video.id,
                model_name: "det".into(),
                model_version: "1".into(),
                scenario: "vehicle_detection".into(),
                prediction_type: PredictionType::Keyframe,
                confidence: 0.5,
                timestamp: 3.0,
                end_timestamp: None,
                bbox: Some(BoundingBox::new(0.0, 0.0, 40.0, 40.0)),
                predicted_tags: PredictionTags::default(),
                parent_prediction_id: None,
            })
            .await
            .unwrap();

        let group = store
            .create_group("cam-a", "vehicle_detection", 0.0, 0.0, 0.0, 0.0)
            .await
            .unwrap();
        store
            .assign_predictions_to_group(&[small.id, large.id], group.id)
            .await
            .unwrap();

        let updated = store.recompute_group_stats(group.id).await.unwrap();
        assert_eq!(updated.member_count, 2);
        // Largest bbox wins the representative slot regardless of confidence
        assert_eq!(updated.representative_prediction_id, Some(large.id));
        assert_eq!(updated.min_timestamp, 1.0);
        assert_eq!(updated.max_timestamp, 3.0);
        assert!(updated.min_timestamp <= updated.max_timestamp);
        assert!((updated.avg_bbox_width - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_clear_groups_unassigns_members() {
        let store = Store::new();
        let video = store
            .insert_video("cam-a", "clip.mp4", 1920, 1080, VideoMetadata::default())
            .await
            .unwrap();
        let p = store
            .insert_prediction(NewPrediction {
                video_id: video.id,
                model_name: "det".into(),
                model_version: "1".into(),
                scenario: "vehicle_detection".into(),
                prediction_type: PredictionType::Keyframe,
                confidence: 0.9,
                timestamp: 1.0,
                end_timestamp: None,
                bbox: Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                predicted_tags: PredictionTags::default(),
                parent_prediction_id: None,
            })
            .await
            .unwrap();
        let group = store
            .create_group("cam-a", "vehicle_detection", 0.0, 0.0, 0.0, 0.0)
            .await
            .unwrap();
        store.assign_predictions_to_group(&[p.id], group.id).await.unwrap();

        let removed = store.clear_groups_for_camera("cam-a").await.unwrap();
        assert_eq!(removed, 1);
        let p = store.get_prediction(p.id).await.unwrap();
        assert!(p.prediction_group_id.is_none());
    }
}
