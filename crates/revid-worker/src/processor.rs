//! Job handlers: one function per job kind, dispatched by the executor.

use std::sync::Arc;

use revid_analysis::{export_training_frames, ClipSource};
use revid_match::{
    CrossingLineMatcher, DirectionMatcher, PredictionGrouper, ReidTrackMatcher, TrackBuilder,
};
use revid_models::SourceTrackType;
use revid_ptz::{VisualCalibrationConfig, VisualCalibrator};
use revid_queue::QueueJob;
use tracing::info;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};

/// Process one job to completion.
pub async fn process_job(ctx: &Arc<WorkerContext>, job: &QueueJob) -> WorkerResult<()> {
    match job {
        QueueJob::AnalyzeClip(j) => analyze_clip(ctx, j.video_id).await,
        QueueJob::GroupPredictions(j) => group_predictions(ctx, &j.camera_id, &j.scenario).await,
        QueueJob::BuildTracks(j) => build_tracks(ctx, &j.camera_id, &j.scenario).await,
        QueueJob::MatchCrossCamera(j) => {
            match_cross_camera(ctx, &j.entity_type, j.include_video_tracks).await
        }
        QueueJob::ResolveIdentities(j) => resolve_identities(ctx, j.source_track_type).await,
        QueueJob::ExportFrames(j) => {
            export_frames(ctx, j.analysis_id, j.top_n, j.min_quality).await
        }
        QueueJob::CalibratePtz(j) => calibrate_ptz(ctx, &j.camera_id, j.num_positions).await,
    }
}

async fn analyze_clip(ctx: &Arc<WorkerContext>, video_id: i64) -> WorkerResult<()> {
    let engine = ctx.analysis_engine();
    let resolved = engine.resolve_clip_source(&ClipSource::Video(video_id)).await?;
    let analysis_ids = engine.run(&resolved).await?;
    info!(video_id, results = analysis_ids.len(), "Clip analysis job complete");
    Ok(())
}

async fn group_predictions(ctx: &Arc<WorkerContext>, camera_id: &str, scenario: &str) -> WorkerResult<()> {
    let grouper = PredictionGrouper::new(ctx.store.clone(), ctx.grouper_config.clone());
    let summary = grouper.group_camera(camera_id, scenario).await?;
    info!(
        camera_id,
        groups_created = summary.groups_created,
        assigned = summary.predictions_assigned,
        "Grouping job complete"
    );
    Ok(())
}

async fn build_tracks(ctx: &Arc<WorkerContext>, camera_id: &str, scenario: &str) -> WorkerResult<()> {
    let builder = TrackBuilder::new(ctx.store.clone(), ctx.grouper_config.clone());
    let summary = builder.build_tracks(camera_id, scenario).await?;
    info!(
        camera_id,
        tracks_created = summary.tracks_created,
        attached = summary.predictions_attached,
        "Track building job complete"
    );
    Ok(())
}

/// Full matching pipeline: crossing lines first (their matches are excluded
/// from the ReID pass), then direction-based, then ReID, then identity
/// resolution and classification propagation.
async fn match_cross_camera(
    ctx: &Arc<WorkerContext>,
    entity_type: &str,
    include_video_tracks: bool,
) -> WorkerResult<()> {
    let crossing = CrossingLineMatcher::new(
        ctx.store.clone(),
        Arc::clone(&ctx.topology),
        ctx.weights.clone(),
        ctx.taxonomy.clone(),
    );
    let crossing_summary = crossing.match_all(entity_type).await?;

    let direction = DirectionMatcher::new(
        ctx.store.clone(),
        Arc::clone(&ctx.topology),
        ctx.weights.clone(),
        ctx.taxonomy.clone(),
    );
    let direction_summary = direction.match_all(entity_type).await?;

    let mut reid = ReidTrackMatcher::new(
        ctx.store.clone(),
        Arc::clone(&ctx.topology),
        ctx.weights.clone(),
        ctx.taxonomy.clone(),
    );
    reid.exclude_pairs(crossing_summary.matched_pairs.iter().copied());
    reid.exclude_pairs(direction_summary.matched_pairs.iter().copied());
    let reid_summary = reid.match_all_pairs(entity_type).await?;
    let video_summary = if include_video_tracks {
        Some(reid.match_all_video_tracks(entity_type).await?)
    } else {
        None
    };

    // Identities are a full recompute after any batch of link changes
    ctx.resolver.resolve(SourceTrackType::CameraObject).await?;
    if include_video_tracks {
        ctx.resolver.resolve(SourceTrackType::VideoTrack).await?;
    }
    let propagation = ctx
        .resolver
        .propagate_classifications(&ctx.config.scenario)
        .await?;

    info!(
        entity_type,
        crossing_links = crossing_summary.links_created,
        direction_links = direction_summary.links_created,
        reid_links = reid_summary.links_created,
        video_links = video_summary.map(|s| s.links_created).unwrap_or(0),
        propagated = propagation.propagated,
        conflicts = propagation.conflicts,
        "Cross-camera matching job complete"
    );
    Ok(())
}

async fn resolve_identities(ctx: &Arc<WorkerContext>, source: SourceTrackType) -> WorkerResult<()> {
    let summary = ctx.resolver.resolve(source).await?;
    info!(
        ?source,
        identities = summary.identities_count,
        tracks_linked = summary.tracks_linked,
        "Identity resolution job complete"
    );
    Ok(())
}

async fn export_frames(
    ctx: &Arc<WorkerContext>,
    analysis_id: i64,
    top_n: usize,
    min_quality: f64,
) -> WorkerResult<()> {
    let summary = export_training_frames(
        &ctx.store,
        &ctx.clips,
        &ctx.config.crops_dir,
        analysis_id,
        top_n,
        min_quality,
    )
    .await?;
    info!(analysis_id, exported = summary.count, "Export job complete");
    Ok(())
}

async fn calibrate_ptz(ctx: &Arc<WorkerContext>, camera_id: &str, num_positions: usize) -> WorkerResult<()> {
    let Some(ptz) = &ctx.ptz else {
        return Err(WorkerError::job_failed("no PTZ hardware configured"));
    };

    let calibrator = VisualCalibrator::new(
        Arc::clone(&ptz.registry),
        Arc::clone(&ptz.frames),
        VisualCalibrationConfig {
            num_positions,
            ..Default::default()
        },
    );
    let report = calibrator.run(camera_id, None).await?;
    info!(
        camera_id,
        successful = report.positions_successful,
        avg_error = report.avg_centering_error,
        "PTZ visual calibration job complete"
    );
    Ok(())
}
