//! Clip analysis result repository.

use chrono::Utc;
use revid_models::{AnalysisId, ClipAnalysisResult, VideoId};

use crate::error::{StoreError, StoreResult};
use crate::state::alloc;
use crate::store::Store;

impl Store {
    /// Insert an analysis result. The store assigns id and created_at.
    pub async fn insert_analysis(&self, mut result: ClipAnalysisResult) -> StoreResult<ClipAnalysisResult> {
        let mut state = self.state.write().await;
        if !state.video_tracks.contains_key(&result.video_track_id) {
            return Err(StoreError::not_found("video_track", result.video_track_id));
        }
        result.id = alloc(&mut state.next_analysis_id);
        result.created_at = Utc::now();
        state.analyses.insert(result.id, result.clone());
        Ok(result)
    }

    /// Fetch an analysis result by id.
    pub async fn get_analysis(&self, id: AnalysisId) -> StoreResult<ClipAnalysisResult> {
        let state = self.state.read().await;
        state
            .analyses
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("clip_analysis_result", id))
    }

    /// All analysis results for a video, ordered by id.
    pub async fn list_analyses_for_video(&self, video_id: VideoId) -> StoreResult<Vec<ClipAnalysisResult>> {
        let state = self.state.read().await;
        let mut out: Vec<ClipAnalysisResult> = state
            .analyses
            .values()
            .filter(|a| a.video_id == video_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    /// Record a training-frame export batch on an analysis.
    pub async fn record_training_export(
        &self,
        id: AnalysisId,
        exported: u32,
        batch_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let analysis = state
            .analyses
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("clip_analysis_result", id))?;
        analysis.training_frames_exported = exported;
        analysis.training_batch_id = Some(batch_id.to_string());
        Ok(())
    }
}
