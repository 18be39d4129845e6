//! Prediction repository.

use chrono::Utc;
use revid_models::{
    BoundingBox, GroupId, Prediction, PredictionId, PredictionTags, PredictionType, ReviewStatus,
    TrackId, VideoId,
};

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

/// Fields for inserting a prediction. The store assigns id, created_at, and
/// the initial `processing` review status.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub video_id: VideoId,
    pub model_name: String,
    pub model_version: String,
    pub scenario: String,
    pub prediction_type: PredictionType,
    pub confidence: f32,
    pub timestamp: f64,
    pub end_timestamp: Option<f64>,
    pub bbox: Option<BoundingBox>,
    pub predicted_tags: PredictionTags,
    pub parent_prediction_id: Option<PredictionId>,
}

impl Store {
    /// Insert a prediction. Keyframe predictions must carry a valid bbox.
    pub async fn insert_prediction(&self, new: NewPrediction) -> StoreResult<Prediction> {
        let mut state = self.state.write().await;

        if !state.videos.contains_key(&new.video_id) {
            return Err(StoreError::not_found("video", new.video_id));
        }

        let id = alloc(&mut state.next_prediction_id);
        let prediction = Prediction {
            id,
            video_id: new.video_id,
            model_name: new.model_name,
            model_version: new.model_version,
            scenario: new.scenario,
            prediction_type: new.prediction_type,
            confidence: new.confidence,
            timestamp: new.timestamp,
            end_timestamp: new.end_timestamp,
            bbox: new.bbox,
            predicted_tags: new.predicted_tags,
            corrected_tags: None,
            review_status: ReviewStatus::Processing,
            prediction_group_id: None,
            camera_object_track_id: None,
            parent_prediction_id: new.parent_prediction_id,
            reviewed_by: None,
            created_at: Utc::now(),
        };
        prediction.validate().map_err(StoreError::bad_input)?;

        state.predictions.insert(id, prediction.clone());
        Ok(prediction)
    }

    /// Fetch a prediction by id.
    pub async fn get_prediction(&self, id: PredictionId) -> StoreResult<Prediction> {
        let state = self.state.read().await;
        state
            .predictions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("prediction", id))
    }

    /// Fetch a batch of predictions, skipping missing ids.
    pub async fn get_predictions(&self, ids: &[PredictionId]) -> StoreResult<Vec<Prediction>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.predictions.get(id).cloned())
            .collect())
    }

    /// Keyframe predictions for a camera + scenario that are not yet grouped,
    /// ordered by timestamp.
    pub async fn list_ungrouped_predictions(
        &self,
        camera_id: &str,
        scenario: &str,
    ) -> StoreResult<Vec<Prediction>> {
        let state = self.state.read().await;
        let mut out: Vec<Prediction> = state
            .predictions
            .values()
            .filter(|p| {
                p.prediction_type == PredictionType::Keyframe
                    && p.scenario == scenario
                    && p.prediction_group_id.is_none()
                    && state
                        .videos
                        .get(&p.video_id)
                        .is_some_and(|v| v.camera_id == camera_id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(out)
    }

    /// All members of a group, ordered by confidence descending.
    pub async fn list_group_members(&self, group_id: GroupId) -> StoreResult<Vec<Prediction>> {
        let state = self.state.read().await;
        let mut out: Vec<Prediction> = state
            .predictions
            .values()
            .filter(|p| p.prediction_group_id == Some(group_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(out)
    }

    /// All members of a camera object track, ordered by timestamp.
    pub async fn list_track_members(&self, track_id: TrackId) -> StoreResult<Vec<Prediction>> {
        let state = self.state.read().await;
        let mut out: Vec<Prediction> = state
            .predictions
            .values()
            .filter(|p| p.camera_object_track_id == Some(track_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(out)
    }

    /// Assign predictions to a group. A prediction belongs to at most one
    /// group; reassigning is allowed only through a regroup that cleared it.
    pub async fn assign_predictions_to_group(
        &self,
        ids: &[PredictionId],
        group_id: GroupId,
    ) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&group_id) {
            return Err(StoreError::not_found("prediction_group", group_id));
        }
        let mut updated = 0;
        for id in ids {
            if let Some(p) = state.predictions.get_mut(id) {
                if p.prediction_group_id.is_some() && p.prediction_group_id != Some(group_id) {
                    return Err(StoreError::conflict(format!(
                        "prediction {id} already belongs to group {:?}",
                        p.prediction_group_id
                    )));
                }
                p.prediction_group_id = Some(group_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Attach predictions to a camera object track.
    pub async fn assign_predictions_to_track(
        &self,
        ids: &[PredictionId],
        track_id: TrackId,
    ) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        if !state.tracks.contains_key(&track_id) {
            return Err(StoreError::not_found("camera_object_track", track_id));
        }
        let mut updated = 0;
        for id in ids {
            if let Some(p) = state.predictions.get_mut(id) {
                if p.camera_object_track_id.is_some() && p.camera_object_track_id != Some(track_id) {
                    return Err(StoreError::conflict(format!(
                        "prediction {id} already belongs to track {:?}",
                        p.camera_object_track_id
                    )));
                }
                p.camera_object_track_id = Some(track_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Set review status (routing or review decisions).
    pub async fn set_review_status(
        &self,
        id: PredictionId,
        status: ReviewStatus,
        reviewed_by: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let p = state
            .predictions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("prediction", id))?;
        p.review_status = status;
        if let Some(reviewer) = reviewed_by {
            p.reviewed_by = Some(reviewer.to_string());
        }
        Ok(())
    }

    /// Overwrite corrected tags on a prediction.
    pub async fn set_corrected_tags(&self, id: PredictionId, tags: PredictionTags) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let p = state
            .predictions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("prediction", id))?;
        p.corrected_tags = Some(tags);
        Ok(())
    }

    /// Propagate a vehicle subtype to a track's approved members that do not
    /// already carry one. Returns how many members were updated.
    pub async fn propagate_subtype_to_members(
        &self,
        track_id: TrackId,
        scenario: &str,
        subtype: &str,
        classified_by: &str,
    ) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for p in state.predictions.values_mut() {
            if p.camera_object_track_id != Some(track_id) || p.scenario != scenario {
                continue;
            }
            if !p.review_status.is_approved() {
                continue;
            }
            let has_subtype = p
                .corrected_tags
                .as_ref()
                .is_some_and(|t| t.vehicle_subtype.is_some());
            if has_subtype {
                continue;
            }
            let tags = p.corrected_tags.get_or_insert_with(PredictionTags::default);
            tags.vehicle_subtype = Some(subtype.to_string());
            tags.classified_by = Some(classified_by.to_string());
            updated += 1;
        }
        Ok(updated)
    }
}
