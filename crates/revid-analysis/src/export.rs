//! Training-frame export: turn the best frames of a completed analysis into
//! keyframe predictions for human review.

use std::path::PathBuf;
use std::sync::Arc;

use revid_media::crops::save_crop;
use revid_media::frames::extract_frame_at;
use revid_media::ClipService;
use revid_models::{
    nearest_point, AnalysisId, PredictionTags, PredictionType,
};
use revid_store::{NewPrediction, Store};
use tracing::{info, warn};

use crate::error::{AnalysisError, AnalysisResult};

/// Outcome of one export run.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub count: u32,
    pub batch_id: Option<String>,
}

/// Export the top-`top_n` frames above `min_quality` from an analysis as
/// pending keyframe predictions, cropping each from the source clip with
/// 10% padding.
pub async fn export_training_frames(
    store: &Store,
    clips: &Arc<dyn ClipService>,
    crops_dir: &PathBuf,
    analysis_id: AnalysisId,
    top_n: usize,
    min_quality: f64,
) -> AnalysisResult<ExportSummary> {
    let analysis = store.get_analysis(analysis_id).await?;
    let video = store.get_video(analysis.video_id).await?;
    let track = store.get_video_track(analysis.video_track_id).await?;

    // Quality scores are stored sorted descending
    let selected: Vec<_> = analysis
        .frame_quality_scores
        .iter()
        .filter(|qs| qs.quality_score >= min_quality)
        .take(top_n)
        .cloned()
        .collect();

    if selected.is_empty() {
        info!(analysis_id, min_quality, "No frames meet the export quality threshold");
        return Ok(ExportSummary { count: 0, batch_id: None });
    }

    let clip_path = clips.locate(&video.filename).await?.ok_or_else(|| {
        AnalysisError::ClipNotResolved(format!("clip {} not in storage", video.filename))
    })?;

    let out_dir = crops_dir.join(format!("analysis_{analysis_id}"));
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(revid_media::MediaError::Io)?;

    let batch_id = format!(
        "clip-analysis-{analysis_id}-{}",
        chrono::Utc::now().timestamp()
    );
    // Anchor clip-relative frame timestamps to wall-clock time
    let clip_start_epoch = video
        .metadata
        .path_times()
        .map(|(start, _, _)| start)
        .unwrap_or_else(|| video.created_at.timestamp() as f64);
    let mut exported = 0u32;

    for qs in &selected {
        // The track bbox nearest this timestamp gives the crop region
        let Some(point) = nearest_point(&track.trajectory, qs.timestamp, 1.0) else {
            continue;
        };
        let bbox = point.bbox();

        let frame_path = out_dir.join(format!("frame_{:.3}_full.jpg", qs.timestamp));
        if let Err(e) = extract_frame_at(&clip_path, qs.timestamp, &frame_path, 60).await {
            warn!(analysis_id, timestamp = qs.timestamp, "Frame extraction failed: {e}");
            continue;
        }

        let crop_path = out_dir.join(format!("frame_{:.3}.jpg", qs.timestamp));
        let crop_bbox = match save_crop(&frame_path, &bbox, 0.1, &crop_path) {
            Ok(b) => b,
            Err(e) => {
                warn!(analysis_id, timestamp = qs.timestamp, "Crop failed: {e}");
                continue;
            }
        };
        let _ = tokio::fs::remove_file(&frame_path).await;

        let prediction = store
            .insert_prediction(NewPrediction {
                video_id: video.id,
                model_name: "clip-analysis-v1".to_string(),
                model_version: "1.0".to_string(),
                scenario: "vehicle_detection".to_string(),
                prediction_type: PredictionType::Keyframe,
                confidence: qs.confidence,
                timestamp: clip_start_epoch + qs.timestamp,
                end_timestamp: None,
                bbox: Some(crop_bbox),
                predicted_tags: PredictionTags {
                    class: Some(analysis.consensus_class.clone()),
                    vehicle_subtype: Some(analysis.consensus_class.clone()),
                    classified_by: None,
                    source: Some("clip_analysis".to_string()),
                },
                parent_prediction_id: None,
            })
            .await?;
        store
            .set_review_status(prediction.id, revid_models::ReviewStatus::Pending, None)
            .await?;

        exported += 1;
    }

    if exported > 0 {
        store
            .record_training_export(analysis_id, exported, &batch_id)
            .await?;
    }

    info!(analysis_id, exported, batch_id = %batch_id, "Training frames exported");
    Ok(ExportSummary {
        count: exported,
        batch_id: Some(batch_id),
    })
}
