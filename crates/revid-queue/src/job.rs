//! Job types for the queue.

use chrono::{DateTime, Utc};
use revid_models::{AnalysisId, SourceTrackType, VideoId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job to analyze one clip: tracking, cleanup, consensus classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeClipJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub created_at: DateTime<Utc>,
}

impl AnalyzeClipJob {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            created_at: Utc::now(),
        }
    }

    /// Idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("analyze:{}", self.video_id)
    }
}

/// Job to cluster a camera's ungrouped predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPredictionsJob {
    pub job_id: JobId,
    pub camera_id: String,
    pub scenario: String,
    pub created_at: DateTime<Utc>,
}

impl GroupPredictionsJob {
    pub fn new(camera_id: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            camera_id: camera_id.into(),
            scenario: scenario.into(),
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("group:{}:{}", self.camera_id, self.scenario)
    }
}

/// Job to promote a camera's groups to object tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTracksJob {
    pub job_id: JobId,
    pub camera_id: String,
    pub scenario: String,
    pub created_at: DateTime<Utc>,
}

impl BuildTracksJob {
    pub fn new(camera_id: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            camera_id: camera_id.into(),
            scenario: scenario.into(),
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("build_tracks:{}:{}", self.camera_id, self.scenario)
    }
}

/// Job to run the full cross-camera matching pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCrossCameraJob {
    pub job_id: JobId,
    pub entity_type: String,
    /// Also match MOT video tracks, not just camera-object tracks
    #[serde(default)]
    pub include_video_tracks: bool,
    pub created_at: DateTime<Utc>,
}

impl MatchCrossCameraJob {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            entity_type: entity_type.into(),
            include_video_tracks: true,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("match:{}", self.entity_type)
    }
}

/// Job to recompute cross-camera identities from links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveIdentitiesJob {
    pub job_id: JobId,
    pub source_track_type: SourceTrackType,
    pub created_at: DateTime<Utc>,
}

impl ResolveIdentitiesJob {
    pub fn new(source_track_type: SourceTrackType) -> Self {
        Self {
            job_id: JobId::new(),
            source_track_type,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("resolve:{:?}", self.source_track_type)
    }
}

/// Job to export training frames from an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFramesJob {
    pub job_id: JobId,
    pub analysis_id: AnalysisId,
    pub top_n: usize,
    pub min_quality: f64,
    pub created_at: DateTime<Utc>,
}

impl ExportFramesJob {
    pub fn new(analysis_id: AnalysisId, top_n: usize, min_quality: f64) -> Self {
        Self {
            job_id: JobId::new(),
            analysis_id,
            top_n,
            min_quality,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("export:{}", self.analysis_id)
    }
}

/// Job to run visual PTZ calibration on one camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratePtzJob {
    pub job_id: JobId,
    pub camera_id: String,
    pub num_positions: usize,
    pub created_at: DateTime<Utc>,
}

impl CalibratePtzJob {
    pub fn new(camera_id: impl Into<String>, num_positions: usize) -> Self {
        Self {
            job_id: JobId::new(),
            camera_id: camera_id.into(),
            num_positions,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("ptz_calibrate:{}", self.camera_id)
    }
}

/// Generic job wrapper dispatched by workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    AnalyzeClip(AnalyzeClipJob),
    GroupPredictions(GroupPredictionsJob),
    BuildTracks(BuildTracksJob),
    MatchCrossCamera(MatchCrossCameraJob),
    ResolveIdentities(ResolveIdentitiesJob),
    ExportFrames(ExportFramesJob),
    CalibratePtz(CalibratePtzJob),
}

impl QueueJob {
    pub fn job_id(&self) -> JobId {
        match self {
            QueueJob::AnalyzeClip(j) => j.job_id,
            QueueJob::GroupPredictions(j) => j.job_id,
            QueueJob::BuildTracks(j) => j.job_id,
            QueueJob::MatchCrossCamera(j) => j.job_id,
            QueueJob::ResolveIdentities(j) => j.job_id,
            QueueJob::ExportFrames(j) => j.job_id,
            QueueJob::CalibratePtz(j) => j.job_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::AnalyzeClip(j) => j.idempotency_key(),
            QueueJob::GroupPredictions(j) => j.idempotency_key(),
            QueueJob::BuildTracks(j) => j.idempotency_key(),
            QueueJob::MatchCrossCamera(j) => j.idempotency_key(),
            QueueJob::ResolveIdentities(j) => j.idempotency_key(),
            QueueJob::ExportFrames(j) => j.idempotency_key(),
            QueueJob::CalibratePtz(j) => j.idempotency_key(),
        }
    }

    /// Short kind label for logging and status entries.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::AnalyzeClip(_) => "analyze_clip",
            QueueJob::GroupPredictions(_) => "group_predictions",
            QueueJob::BuildTracks(_) => "build_tracks",
            QueueJob::MatchCrossCamera(_) => "match_cross_camera",
            QueueJob::ResolveIdentities(_) => "resolve_identities",
            QueueJob::ExportFrames(_) => "export_frames",
            QueueJob::CalibratePtz(_) => "calibrate_ptz",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_job_serde_roundtrip() {
        let job = QueueJob::AnalyzeClip(AnalyzeClipJob::new(42));
        let json = serde_json::to_string(&job).expect("serialize QueueJob");
        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");
        match decoded {
            QueueJob::AnalyzeClip(j) => assert_eq!(j.video_id, 42),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_idempotency_keys_distinguish_targets() {
        let a = QueueJob::AnalyzeClip(AnalyzeClipJob::new(1));
        let b = QueueJob::AnalyzeClip(AnalyzeClipJob::new(2));
        assert_ne!(a.idempotency_key(), b.idempotency_key());

        // Same target: same key, regardless of job id
        let c = QueueJob::AnalyzeClip(AnalyzeClipJob::new(1));
        assert_eq!(a.idempotency_key(), c.idempotency_key());
    }
}
