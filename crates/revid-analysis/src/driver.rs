//! MOT tracker driver: runs the detector over a sanitized clip and turns
//! tracker assignments into video tracks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use revid_media::crops::save_crop;
use revid_media::frames::{extract_frames, ExtractedFrame};
use revid_ml_client::{Detection, ObjectDetector, ReidEmbedder};
use revid_models::{ClassTaxonomy, TrajectoryPoint, Video};
use revid_store::NewVideoTrack;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::tracker::{ByteTracker, ByteTrackerConfig, TrackerDetection};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct MotDriverConfig {
    /// Detection confidence floor fed to the detector
    pub inference_conf: f32,
    /// Drop detections smaller than this in either dimension, pixels
    pub min_box_px: f64,
    /// Subprocess budget for tracking one clip
    pub timeout_secs: u64,
    /// Where best-crop JPEGs are written
    pub crops_dir: PathBuf,
    /// Tracker association parameters
    pub tracker: ByteTrackerConfig,
}

impl Default for MotDriverConfig {
    fn default() -> Self {
        Self {
            inference_conf: 0.08,
            min_box_px: 5.0,
            timeout_secs: 900,
            crops_dir: PathBuf::from("/tmp/revid/crops"),
            tracker: ByteTrackerConfig::default(),
        }
    }
}

/// Per-track accumulation while scanning frames.
struct TrackAccumulator {
    trajectory: Vec<TrajectoryPoint>,
    /// Confidence-weighted votes per class name
    class_votes: HashMap<String, f64>,
    /// Best frame so far by area x confidence
    best: Option<BestFrame>,
}

struct BestFrame {
    score: f64,
    frame_path: PathBuf,
    detection: Detection,
}

/// Runs a ByteTrack-style tracker over a clip, emitting one video track per
/// persistent id plus trajectory samples with monotonically increasing
/// timestamps.
pub struct MotDriver {
    detector: Arc<dyn ObjectDetector>,
    embedder: Option<Arc<dyn ReidEmbedder>>,
    taxonomy: ClassTaxonomy,
    config: MotDriverConfig,
}

impl MotDriver {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        embedder: Option<Arc<dyn ReidEmbedder>>,
        taxonomy: ClassTaxonomy,
        config: MotDriverConfig,
    ) -> Self {
        Self {
            detector,
            embedder,
            taxonomy,
            config,
        }
    }

    /// Track one clip. `clip_start_epoch` anchors clip-relative timestamps to
    /// wall-clock time for cross-camera matching.
    pub async fn track(
        &self,
        clip_path: &Path,
        video: &Video,
        clip_start_epoch: f64,
    ) -> AnalysisResult<Vec<NewVideoTrack>> {
        let frame_dir = tempfile_dir(clip_path)?;
        let frames = extract_frames(clip_path, &frame_dir, 1, self.config.timeout_secs).await?;
        if frames.is_empty() {
            return Err(AnalysisError::CorruptClip(format!(
                "no decodable frames in {}",
                clip_path.display()
            )));
        }
        info!(
            clip = %clip_path.display(),
            frames = frames.len(),
            camera = %video.camera_id,
            "Running MOT over clip"
        );

        let mut tracker = ByteTracker::new(self.config.tracker.clone());
        let mut accumulators: HashMap<u32, TrackAccumulator> = HashMap::new();
        let mut dropped_class = 0usize;
        let mut dropped_tiny = 0usize;

        for frame in &frames {
            let detections = match self.detect_frame(frame).await {
                Ok(d) => d,
                Err(e) => {
                    debug!(frame = frame.frame_index, "Detection failed on frame: {e}");
                    continue;
                }
            };

            let mut kept: Vec<Detection> = Vec::new();
            for det in detections {
                if !self.taxonomy.is_tracked_class(&det.class_name) {
                    dropped_class += 1;
                    continue;
                }
                if det.bbox.w < self.config.min_box_px || det.bbox.h < self.config.min_box_px {
                    dropped_tiny += 1;
                    continue;
                }
                kept.push(det);
            }

            let tracker_dets: Vec<TrackerDetection> = kept
                .iter()
                .map(|d| TrackerDetection {
                    bbox: d.bbox,
                    score: d.confidence,
                })
                .collect();

            for assignment in tracker.update(&tracker_dets) {
                let det = &kept[assignment.detection_index];
                let acc = accumulators.entry(assignment.track_id).or_insert_with(|| TrackAccumulator {
                    trajectory: Vec::new(),
                    class_votes: HashMap::new(),
                    best: None,
                });

                acc.trajectory.push(TrajectoryPoint {
                    timestamp: frame.timestamp,
                    x: det.bbox.x,
                    y: det.bbox.y,
                    w: det.bbox.w,
                    h: det.bbox.h,
                    conf: det.confidence,
                });
                *acc.class_votes.entry(det.class_name.clone()).or_insert(0.0) +=
                    det.confidence as f64;

                let score = det.bbox.area() * det.confidence as f64;
                if acc.best.as_ref().is_none_or(|b| score > b.score) {
                    acc.best = Some(BestFrame {
                        score,
                        frame_path: frame.path.clone(),
                        detection: det.clone(),
                    });
                }
            }
        }

        if dropped_class + dropped_tiny > 0 {
            debug!(dropped_class, dropped_tiny, "Filtered detections during tracking");
        }

        let mut tracks = Vec::new();
        for (tracker_id, acc) in accumulators {
            if acc.trajectory.is_empty() {
                continue;
            }

            let class_name = acc
                .class_votes
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(c, _)| c.clone())
                .unwrap_or_else(|| "unknown".to_string());

            let (best_crop_path, reid_embedding) = match &acc.best {
                Some(best) => self.save_best_crop(video, tracker_id, best).await,
                None => (None, None),
            };

            let first = acc.trajectory.first().expect("non-empty trajectory").timestamp;
            let last = acc.trajectory.last().expect("non-empty trajectory").timestamp;

            tracks.push(NewVideoTrack {
                video_id: video.id,
                camera_id: video.camera_id.clone(),
                tracker_track_id: tracker_id,
                class_name,
                trajectory: acc.trajectory,
                first_seen_epoch: clip_start_epoch + first,
                last_seen_epoch: clip_start_epoch + last,
                best_crop_path,
                reid_embedding,
            });
        }

        tracks.sort_by_key(|t| t.tracker_track_id);
        info!(
            clip = %clip_path.display(),
            tracks = tracks.len(),
            "MOT complete"
        );

        let _ = tokio::fs::remove_dir_all(&frame_dir).await;
        Ok(tracks)
    }

    async fn detect_frame(&self, frame: &ExtractedFrame) -> AnalysisResult<Vec<Detection>> {
        let bytes = tokio::fs::read(&frame.path).await.map_err(revid_media::MediaError::Io)?;
        Ok(self.detector.detect(&bytes, self.config.inference_conf).await?)
    }

    /// Save the best crop (10% padding) and embed it when an embedder is
    /// wired. Both steps are best-effort.
    async fn save_best_crop(
        &self,
        video: &Video,
        tracker_id: u32,
        best: &BestFrame,
    ) -> (Option<String>, Option<Vec<f32>>) {
        if let Err(e) = tokio::fs::create_dir_all(&self.config.crops_dir).await {
            warn!("Cannot create crops dir: {e}");
            return (None, None);
        }

        let crop_path = self
            .config
            .crops_dir
            .join(format!("video_{}_track_{}.jpg", video.id, tracker_id));

        if let Err(e) = save_crop(&best.frame_path, &best.detection.bbox, 0.1, &crop_path) {
            warn!(tracker_id, "Failed to save best crop: {e}");
            return (None, None);
        }

        let embedding = match &self.embedder {
            Some(embedder) => match tokio::fs::read(&crop_path).await {
                Ok(bytes) => match embedder.embed(&bytes).await {
                    Ok(vec) => Some(vec),
                    Err(e) => {
                        warn!(tracker_id, "Embedding failed for crop: {e}");
                        None
                    }
                },
                Err(e) => {
                    warn!(tracker_id, "Cannot read crop back: {e}");
                    None
                }
            },
            None => None,
        };

        (Some(crop_path.to_string_lossy().to_string()), embedding)
    }
}

/// Unique frame directory next to the system temp dir.
fn tempfile_dir(clip_path: &Path) -> AnalysisResult<PathBuf> {
    let stem = clip_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    let dir = std::env::temp_dir().join(format!("revid_frames_{}_{}", stem, std::process::id()));
    std::fs::create_dir_all(&dir).map_err(revid_media::MediaError::Io)?;
    Ok(dir)
}
