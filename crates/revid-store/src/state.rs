//! Internal store state. All access goes through `Store`'s lock.

use std::collections::HashMap;

use revid_models::{
    AnalysisId, CalibrationPointId, Camera, CameraObjectTrack, ClipAnalysisResult, CrossCameraLink,
    CrossingLine, CrossingLineId, GroupId, LinkId, Prediction, PredictionGroup, PredictionId,
    PtzCalibrationPoint, TopologyEdge, TrackId, Video, VideoId, VideoTrack, VideoTrackId,
};

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) videos: HashMap<VideoId, Video>,
    pub(crate) cameras: HashMap<String, Camera>,
    pub(crate) predictions: HashMap<PredictionId, Prediction>,
    pub(crate) groups: HashMap<GroupId, PredictionGroup>,
    pub(crate) tracks: HashMap<TrackId, CameraObjectTrack>,
    pub(crate) video_tracks: HashMap<VideoTrackId, VideoTrack>,
    pub(crate) analyses: HashMap<AnalysisId, ClipAnalysisResult>,
    pub(crate) links: HashMap<LinkId, CrossCameraLink>,
    /// (track_a, track_b) -> link id; pairs are stored normalized (a < b)
    pub(crate) link_pairs: HashMap<(TrackId, TrackId), LinkId>,
    /// (camera_a, camera_b) -> directional edge
    pub(crate) topology: HashMap<(String, String), TopologyEdge>,
    pub(crate) crossing_lines: HashMap<CrossingLineId, CrossingLine>,
    pub(crate) calibration_points: HashMap<CalibrationPointId, PtzCalibrationPoint>,

    pub(crate) next_video_id: VideoId,
    pub(crate) next_prediction_id: PredictionId,
    pub(crate) next_group_id: GroupId,
    pub(crate) next_track_id: TrackId,
    pub(crate) next_video_track_id: VideoTrackId,
    pub(crate) next_analysis_id: AnalysisId,
    pub(crate) next_link_id: LinkId,
    pub(crate) next_line_id: CrossingLineId,
    pub(crate) next_calibration_id: CalibrationPointId,
}

impl State {
    pub(crate) fn new() -> Self {
        Self {
            next_video_id: 1,
            next_prediction_id: 1,
            next_group_id: 1,
            next_track_id: 1,
            next_video_track_id: 1,
            next_analysis_id: 1,
            next_link_id: 1,
            next_line_id: 1,
            next_calibration_id: 1,
            ..Default::default()
        }
    }
}

/// Allocate the next id from a counter field.
pub(crate) fn alloc(counter: &mut i64) -> i64 {
    let id = *counter;
    *counter += 1;
    id
}
