//! Clip analysis orchestration.
//!
//! Runs the full pipeline for one clip: sanitize, ensure video tracks exist
//! (running MOT when needed), clean tracker artifacts, classify every
//! sampled frame, and persist one consensus record per surviving track.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use revid_media::frames::extract_frames;
use revid_media::sanitize::{sanitize_clip, SanitizeOutcome};
use revid_media::ClipService;
use revid_ml_client::{Detection, ObjectDetector, ReidEmbedder};
use revid_models::{
    compute_travel_direction, AnalysisConfig, AnalysisId, AnalysisStatus, ClassTaxonomy,
    ClipAnalysisResult, FrameClassification, ReviewStatus, Video, VideoId, VideoTrack,
    VideoTrackStatus,
};
use revid_store::Store;
use tracing::{info, warn};

use crate::classify::{compute_weighted_consensus, match_frame_to_tracks, score_frame_quality};
use crate::driver::{MotDriver, MotDriverConfig};
use crate::error::{AnalysisError, AnalysisResult};
use crate::postprocess::{clean_trajectory_jumps, merge_overlapping_tracks, stitch_sequential_tracks};

/// Where a clip to analyze comes from.
#[derive(Debug, Clone)]
pub enum ClipSource {
    /// A stored video row; the clip is located by filename
    Video(VideoId),
    /// An upstream NVR event; the clip is fetched by event id
    Event { event_id: String, camera_id: String },
    /// A direct filesystem path
    Path(PathBuf),
}

/// A resolved (clip_path, video, camera) triple.
#[derive(Debug, Clone)]
pub struct ResolvedClip {
    pub clip_path: PathBuf,
    pub video: Video,
}

/// The clip analysis engine.
pub struct ClipAnalysisEngine {
    store: Store,
    detector: Arc<dyn ObjectDetector>,
    embedder: Option<Arc<dyn ReidEmbedder>>,
    clips: Arc<dyn ClipService>,
    taxonomy: ClassTaxonomy,
    config: AnalysisConfig,
    driver_config: MotDriverConfig,
}

impl ClipAnalysisEngine {
    pub fn new(
        store: Store,
        detector: Arc<dyn ObjectDetector>,
        embedder: Option<Arc<dyn ReidEmbedder>>,
        clips: Arc<dyn ClipService>,
        taxonomy: ClassTaxonomy,
        config: AnalysisConfig,
        driver_config: MotDriverConfig,
    ) -> Self {
        Self {
            store,
            detector,
            embedder,
            clips,
            taxonomy,
            config,
            driver_config,
        }
    }

    /// Resolve any clip source to a canonical clip path + video row.
    pub async fn resolve_clip_source(&self, source: &ClipSource) -> AnalysisResult<ResolvedClip> {
        match source {
            ClipSource::Video(video_id) => {
                let video = self.store.get_video(*video_id).await?;
                let clip_path = self
                    .clips
                    .locate(&video.filename)
                    .await?
                    .ok_or_else(|| {
                        AnalysisError::ClipNotResolved(format!(
                            "video file {} not found in clip storage",
                            video.filename
                        ))
                    })?;
                Ok(ResolvedClip { clip_path, video })
            }
            ClipSource::Event { event_id, camera_id } => {
                let fetched = self.clips.fetch_clip(event_id, camera_id).await?;
                if !fetched.success {
                    return Err(AnalysisError::ClipNotResolved(
                        fetched.error.unwrap_or_else(|| format!("event {event_id} fetch failed")),
                    ));
                }
                let filename = fetched
                    .path
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_default();
                let video = match self.store.find_video_by_filename(&filename).await? {
                    Some(v) => v,
                    None => {
                        return Err(AnalysisError::ClipNotResolved(format!(
                            "no video record for fetched clip {filename}"
                        )))
                    }
                };
                Ok(ResolvedClip { clip_path: fetched.path, video })
            }
            ClipSource::Path(path) => {
                if !path.exists() {
                    return Err(AnalysisError::ClipNotResolved(format!(
                        "clip path does not exist: {}",
                        path.display()
                    )));
                }
                let filename = path
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_default();
                let video = self
                    .store
                    .find_video_by_filename(&filename)
                    .await?
                    .ok_or_else(|| {
                        AnalysisError::ClipNotResolved(format!("no video record for {filename}"))
                    })?;
                Ok(ResolvedClip { clip_path: path.clone(), video })
            }
        }
    }

    /// Run full clip analysis for a resolved clip.
    ///
    /// Returns the ids of the analysis records created. A corrupt clip ends
    /// the job with [`AnalysisError::CorruptClip`] and persists nothing.
    pub async fn run(&self, resolved: &ResolvedClip) -> AnalysisResult<Vec<AnalysisId>> {
        let video = &resolved.video;
        info!(
            video_id = video.id,
            camera = %video.camera_id,
            clip = %resolved.clip_path.display(),
            "Starting clip analysis"
        );

        // Step 0: sanitize
        let clip_path = match sanitize_clip(&resolved.clip_path, self.config.min_clip_duration_sec).await? {
            SanitizeOutcome::Clean(p) | SanitizeOutcome::Sanitized(p) => p,
            SanitizeOutcome::Rejected => {
                return Err(AnalysisError::CorruptClip(
                    resolved.clip_path.display().to_string(),
                ))
            }
        };

        // Step 1: ensure video tracks exist
        let existing = self.store.list_video_tracks(video.id).await?;
        if existing.is_empty() {
            let clip_start_epoch = video
                .metadata
                .path_times()
                .map(|(start, _, _)| start)
                .unwrap_or_else(|| video.created_at.timestamp() as f64);
            let driver = MotDriver::new(
                Arc::clone(&self.detector),
                self.embedder.clone(),
                self.taxonomy.clone(),
                self.driver_config.clone(),
            );
            let new_tracks = driver.track(&clip_path, video, clip_start_epoch).await?;
            if new_tracks.is_empty() {
                warn!(video_id = video.id, "Clip tracking produced no tracks");
                return Err(AnalysisError::NoTracks);
            }
            for track in new_tracks {
                self.store.insert_video_track(track).await?;
            }
        }

        // Step 2: fetch active tracks and run the three cleanup passes
        let tracks = self.store.list_active_video_tracks(video.id).await?;
        if tracks.is_empty() {
            warn!(video_id = video.id, "No active video tracks");
            return Err(AnalysisError::NoTracks);
        }
        let tracks = self.postprocess(video.id, tracks).await?;

        // Step 3: per-frame classifications
        let probe = self.clips.probe_clip(&clip_path).await?;
        let (frame_w, frame_h) = if probe.width > 0 && probe.height > 0 {
            (probe.width, probe.height)
        } else {
            (self.config.default_frame_width, self.config.default_frame_height)
        };

        let classifications = self
            .extract_per_frame_classifications(&clip_path, &tracks, probe.duration_seconds)
            .await?;

        // Steps 4-6: consensus, quality, direction, persist
        let mut analysis_ids = Vec::new();
        for track in &tracks {
            let Some(frames) = classifications.get(&track.id) else {
                continue;
            };
            if frames.is_empty() {
                continue;
            }

            let consensus = compute_weighted_consensus(frames);
            let quality = score_frame_quality(frames, &consensus.consensus_class, frame_w, frame_h);
            let direction = compute_travel_direction(&track.trajectory).map(|m| m.direction);

            let result = self
                .store
                .insert_analysis(ClipAnalysisResult {
                    id: 0,
                    video_id: video.id,
                    video_track_id: track.id,
                    camera_id: video.camera_id.clone(),
                    consensus_class: consensus.consensus_class.clone(),
                    consensus_confidence: consensus.consensus_confidence,
                    class_distribution: consensus.class_distribution,
                    total_frames: frames.len() as u32,
                    frame_classifications: frames.clone(),
                    frame_quality_scores: quality,
                    duration_seconds: probe.duration_seconds,
                    direction_of_travel: direction,
                    status: AnalysisStatus::Completed,
                    review_status: ReviewStatus::Pending,
                    corrected_bbox: None,
                    issue_reason: None,
                    training_frames_exported: 0,
                    training_batch_id: None,
                    created_at: Utc::now(),
                })
                .await?;

            info!(
                analysis_id = result.id,
                track_id = track.id,
                class = %result.consensus_class,
                confidence = result.consensus_confidence,
                frames = result.total_frames,
                "Clip analysis result stored"
            );
            analysis_ids.push(result.id);
        }

        info!(
            video_id = video.id,
            results = analysis_ids.len(),
            "Clip analysis complete"
        );
        Ok(analysis_ids)
    }

    /// Run the three post-processing passes in strict order, persisting each
    /// pass before the next reads the survivors.
    async fn postprocess(
        &self,
        video_id: VideoId,
        mut tracks: Vec<VideoTrack>,
    ) -> AnalysisResult<Vec<VideoTrack>> {
        // (a) merge overlapping
        let merged = merge_overlapping_tracks(&tracks, &self.config);
        if !merged.is_empty() {
            self.store
                .set_video_track_status(&merged, VideoTrackStatus::Merged)
                .await?;
            tracks.retain(|t| !merged.contains(&t.id));
        }

        // (b) stitch sequential fragments
        let stitched = stitch_sequential_tracks(&tracks, &self.config);
        if !stitched.is_empty() {
            self.store
                .set_video_track_status(&stitched, VideoTrackStatus::Merged)
                .await?;
            tracks.retain(|t| !stitched.contains(&t.id));
        }
        info!(video_id, remaining = tracks.len(), "Track dedup complete");

        // (c) clean trajectory jumps
        if self.config.clean_jumps {
            let outcome = clean_trajectory_jumps(&tracks, &self.config);
            if !outcome.deactivate.is_empty() {
                self.store
                    .set_video_track_status(&outcome.deactivate, VideoTrackStatus::JumpFragmented)
                    .await?;
                tracks.retain(|t| !outcome.deactivate.contains(&t.id));
            }
            for (track_id, trajectory) in outcome.cleaned {
                self.store
                    .update_video_track_trajectory(track_id, trajectory.clone())
                    .await?;
                if let Some(track) = tracks.iter_mut().find(|t| t.id == track_id) {
                    track.trajectory = trajectory;
                    track.refresh_aggregates();
                }
            }
        }

        Ok(tracks)
    }

    /// Sample frames, run the detector on each, and match detections to
    /// visible tracks by IoU.
    async fn extract_per_frame_classifications(
        &self,
        clip_path: &Path,
        tracks: &[VideoTrack],
        duration_seconds: f64,
    ) -> AnalysisResult<HashMap<i64, Vec<FrameClassification>>> {
        // Every 2nd frame for long clips, every frame otherwise
        let step = if duration_seconds > self.config.sparse_sample_over_sec { 2 } else { 1 };

        let frame_dir = std::env::temp_dir().join(format!(
            "revid_classify_{}_{}",
            std::process::id(),
            clip_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        ));
        let frames = extract_frames(clip_path, &frame_dir, step, 600).await?;

        let trajectories: Vec<&[revid_models::TrajectoryPoint]> =
            tracks.iter().map(|t| t.trajectory.as_slice()).collect();

        let mut classifications: HashMap<i64, Vec<FrameClassification>> =
            tracks.iter().map(|t| (t.id, Vec::new())).collect();
        let mut frames_processed = 0usize;

        for frame in &frames {
            let bytes = match tokio::fs::read(&frame.path).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            let detections = match self.detector.detect(&bytes, self.config.inference_conf).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(frame = frame.frame_index, "Inference failed on frame: {e}");
                    continue;
                }
            };
            frames_processed += 1;

            // Vehicle consensus only: non-vehicle classes (and the person
            // pre-screen) do not vote
            let vehicle_dets: Vec<Detection> = detections
                .into_iter()
                .filter(|d| {
                    d.class_name != "person"
                        && self.taxonomy.is_tracked_class(&d.class_name)
                        && d.bbox.w >= self.config.min_box_px
                        && d.bbox.h >= self.config.min_box_px
                })
                .map(|mut d| {
                    d.class_name = self.taxonomy.display_name(&d.class_name).to_string();
                    d
                })
                .collect();

            for (track_idx, fc) in
                match_frame_to_tracks(frame.timestamp, &vehicle_dets, &trajectories, self.config.classify_min_iou)
            {
                classifications
                    .entry(tracks[track_idx].id)
                    .or_default()
                    .push(fc);
            }
        }

        let total: usize = classifications.values().map(Vec::len).sum();
        info!(
            classifications = total,
            tracks = tracks.len(),
            frames_processed,
            "Per-frame classification complete"
        );

        let _ = tokio::fs::remove_dir_all(&frame_dir).await;
        Ok(classifications)
    }
}
