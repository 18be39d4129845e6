//! Prediction grouper: spatial-temporal clustering of keyframe predictions.
//!
//! Each unassigned prediction either joins an existing group whose centroid
//! is within one average bbox diagonal, whose average bbox area is within
//! the tolerance band, and whose timestamp window overlaps or abuts, or it
//! seeds a new group. Batches for one (camera, scenario) are serialized so
//! concurrent ingest cannot create duplicate groups; different cameras run
//! in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use revid_models::{GroupId, Prediction, ReviewStatus};
use revid_store::Store;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::MatchResult;

/// Grouping and track-building thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrouperConfig {
    /// Centroid distance limit, in units of the group's average bbox diagonal
    pub max_centroid_distance_diagonals: f64,
    /// Minimum min/max area ratio between a prediction and the group average
    pub area_ratio_tolerance: f64,
    /// Group timestamp window may be extended by this many seconds ("abuts")
    pub group_time_gap_sec: f64,
    /// Longer horizon used when matching predictions to tracks
    pub track_time_gap_sec: f64,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            max_centroid_distance_diagonals: 1.0,
            area_ratio_tolerance: 0.25,
            group_time_gap_sec: 60.0,
            track_time_gap_sec: 600.0,
        }
    }
}

/// Working aggregate while a batch is being clustered.
#[derive(Debug, Clone)]
pub(crate) struct ClusterAggregate {
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub avg_w: f64,
    pub avg_h: f64,
    pub min_ts: f64,
    pub max_ts: f64,
    pub count: u32,
}

impl ClusterAggregate {
    pub(crate) fn from_prediction(p: &Prediction) -> Option<Self> {
        let bbox = p.bbox?;
        let (cx, cy) = bbox.center();
        Some(Self {
            centroid_x: cx,
            centroid_y: cy,
            avg_w: bbox.w,
            avg_h: bbox.h,
            min_ts: p.timestamp,
            max_ts: p.timestamp,
            count: 1,
        })
    }

    pub(crate) fn diagonal(&self) -> f64 {
        (self.avg_w * self.avg_w + self.avg_h * self.avg_h).sqrt()
    }

    pub(crate) fn avg_area(&self) -> f64 {
        self.avg_w * self.avg_h
    }

    /// Does `p` belong to this cluster under the given time horizon?
    pub(crate) fn accepts(&self, p: &Prediction, config: &GrouperConfig, time_gap: f64) -> bool {
        let Some(bbox) = p.bbox else {
            return false;
        };

        // Timestamp window overlaps or abuts
        if p.timestamp < self.min_ts - time_gap || p.timestamp > self.max_ts + time_gap {
            return false;
        }

        // Centroid within one average diagonal
        let (cx, cy) = bbox.center();
        let dist = ((cx - self.centroid_x).powi(2) + (cy - self.centroid_y).powi(2)).sqrt();
        let diag = self.diagonal();
        if diag <= 0.0 || dist > diag * config.max_centroid_distance_diagonals {
            return false;
        }

        // Area within the tolerance band
        let area = bbox.area();
        let avg_area = self.avg_area();
        if area <= 0.0 || avg_area <= 0.0 {
            return false;
        }
        let ratio = area.min(avg_area) / area.max(avg_area);
        ratio >= config.area_ratio_tolerance
    }

    /// Fold `p` into the running aggregates.
    pub(crate) fn absorb(&mut self, p: &Prediction) {
        let Some(bbox) = p.bbox else {
            return;
        };
        let (cx, cy) = bbox.center();
        let n = self.count as f64;
        self.centroid_x = (self.centroid_x * n + cx) / (n + 1.0);
        self.centroid_y = (self.centroid_y * n + cy) / (n + 1.0);
        self.avg_w = (self.avg_w * n + bbox.w) / (n + 1.0);
        self.avg_h = (self.avg_h * n + bbox.h) / (n + 1.0);
        self.min_ts = self.min_ts.min(p.timestamp);
        self.max_ts = self.max_ts.max(p.timestamp);
        self.count += 1;
    }
}

/// Summary of one grouping batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingSummary {
    pub groups_created: usize,
    pub predictions_assigned: usize,
}

/// The prediction grouper.
pub struct PredictionGrouper {
    store: Store,
    config: GrouperConfig,
    /// One lock per (camera, scenario): concurrent batches for the same key
    /// would race on group creation
    batch_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl PredictionGrouper {
    pub fn new(store: Store, config: GrouperConfig) -> Self {
        Self {
            store,
            config,
            batch_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn batch_lock(&self, camera_id: &str, scenario: &str) -> Arc<Mutex<()>> {
        let mut locks = self.batch_locks.lock().await;
        locks
            .entry((camera_id.to_string(), scenario.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Cluster all currently ungrouped keyframe predictions for one camera.
    pub async fn group_camera(&self, camera_id: &str, scenario: &str) -> MatchResult<GroupingSummary> {
        let lock = self.batch_lock(camera_id, scenario).await;
        let _guard = lock.lock().await;

        let ungrouped = self.store.list_ungrouped_predictions(camera_id, scenario).await?;
        if ungrouped.is_empty() {
            return Ok(GroupingSummary::default());
        }

        // Load existing pending groups as live aggregates
        let mut aggregates: Vec<(GroupId, ClusterAggregate)> = Vec::new();
        for g in self.store.list_groups(camera_id, scenario, ReviewStatus::Pending).await? {
            aggregates.push((
                g.id,
                ClusterAggregate {
                    centroid_x: g.bbox_centroid_x,
                    centroid_y: g.bbox_centroid_y,
                    avg_w: g.avg_bbox_width,
                    avg_h: g.avg_bbox_height,
                    min_ts: g.min_timestamp,
                    max_ts: g.max_timestamp,
                    count: g.member_count,
                },
            ));
        }

        let mut summary = GroupingSummary::default();
        let mut touched: HashSet<GroupId> = HashSet::new();

        for p in &ungrouped {
            if p.bbox.is_none() {
                continue;
            }

            let matched = aggregates
                .iter_mut()
                .find(|(_, agg)| agg.accepts(p, &self.config, self.config.group_time_gap_sec));

            match matched {
                Some((group_id, agg)) => {
                    self.store.assign_predictions_to_group(&[p.id], *group_id).await?;
                    agg.absorb(p);
                    touched.insert(*group_id);
                    summary.predictions_assigned += 1;
                }
                None => {
                    let Some(agg) = ClusterAggregate::from_prediction(p) else {
                        continue;
                    };
                    let group = self
                        .store
                        .create_group(camera_id, scenario, agg.centroid_x, agg.centroid_y, agg.avg_w, agg.avg_h)
                        .await?;
                    self.store.assign_predictions_to_group(&[p.id], group.id).await?;
                    touched.insert(group.id);
                    aggregates.push((group.id, agg));
                    summary.groups_created += 1;
                    summary.predictions_assigned += 1;
                }
            }
        }

        // Recompute authoritative aggregates once per touched group
        for group_id in touched {
            self.store.recompute_group_stats(group_id).await?;
        }

        info!(
            camera_id,
            scenario,
            groups_created = summary.groups_created,
            assigned = summary.predictions_assigned,
            "Prediction grouping complete"
        );
        Ok(summary)
    }

    /// Delete a camera's groups and cluster everything again.
    pub async fn regroup_camera(&self, camera_id: &str, scenario: &str) -> MatchResult<GroupingSummary> {
        {
            let lock = self.batch_lock(camera_id, scenario).await;
            let _guard = lock.lock().await;
            let removed = self.store.clear_groups_for_camera(camera_id).await?;
            info!(camera_id, removed, "Cleared groups for regroup");
        }
        self.group_camera(camera_id, scenario).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revid_models::{BoundingBox, PredictionTags, PredictionType, VideoMetadata};
    use revid_store::NewPrediction;

    async fn seed(store: &Store, camera: &str) -> i64 {
        store
            .insert_video(camera, format!("{camera}.mp4"), 1920, 1080, VideoMetadata::default())
            .await
            .unwrap()
            .id
    }

    async fn insert_keyframe(store: &Store, video_id: i64, ts: f64, bbox: BoundingBox) -> Prediction {
        store
            .insert_prediction(NewPrediction {
                video_id,
                model_name: "det".into(),
                model_version: "1".into(),
                scenario: "vehicle_detection".into(),
                prediction_type: PredictionType::Keyframe,
                confidence: 0.8,
                timestamp: ts,
                end_timestamp: None,
                bbox: Some(bbox),
                predicted_tags: PredictionTags::default(),
                parent_prediction_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_nearby_predictions_share_a_group() {
        let store = Store::new();
        let video = seed(&store, "cam-a").await;

        insert_keyframe(&store, video, 100.0, BoundingBox::new(100.0, 100.0, 60.0, 40.0)).await;
        insert_keyframe(&store, video, 101.0, BoundingBox::new(104.0, 102.0, 58.0, 41.0)).await;
        // Far away spatially: its own group
        insert_keyframe(&store, video, 100.5, BoundingBox::new(900.0, 600.0, 60.0, 40.0)).await;

        let grouper = PredictionGrouper::new(store.clone(), GrouperConfig::default());
        let summary = grouper.group_camera("cam-a", "vehicle_detection").await.unwrap();

        assert_eq!(summary.groups_created, 2);
        assert_eq!(summary.predictions_assigned, 3);

        let groups = store
            .list_groups("cam-a", "vehicle_detection", ReviewStatus::Pending)
            .await
            .unwrap();
        let counts: Vec<u32> = {
            let mut c: Vec<u32> = groups.iter().map(|g| g.member_count).collect();
            c.sort();
            c
        };
        assert_eq!(counts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_time_gap_splits_groups() {
        let store = Store::new();
        let video = seed(&store, "cam-a").await;

        insert_keyframe(&store, video, 100.0, BoundingBox::new(100.0, 100.0, 60.0, 40.0)).await;
        // Same spot, two hours later: a different visit
        insert_keyframe(&store, video, 7300.0, BoundingBox::new(100.0, 100.0, 60.0, 40.0)).await;

        let grouper = PredictionGrouper::new(store.clone(), GrouperConfig::default());
        let summary = grouper.group_camera("cam-a", "vehicle_detection").await.unwrap();
        assert_eq!(summary.groups_created, 2);
    }

    #[tokio::test]
    async fn test_area_band_rejects_mismatched_sizes() {
        let store = Store::new();
        let video = seed(&store, "cam-a").await;

        insert_keyframe(&store, video, 100.0, BoundingBox::new(100.0, 100.0, 60.0, 40.0)).await;
        // Same centroid, tenfold area: different object
        insert_keyframe(&store, video, 100.5, BoundingBox::new(35.0, 55.0, 190.0, 130.0)).await;

        let grouper = PredictionGrouper::new(store.clone(), GrouperConfig::default());
        let summary = grouper.group_camera("cam-a", "vehicle_detection").await.unwrap();
        assert_eq!(summary.groups_created, 2);
    }

    #[tokio::test]
    async fn test_grouping_is_incremental() {
        let store = Store::new();
        let video = seed(&store, "cam-a").await;
        let grouper = PredictionGrouper::new(store.clone(), GrouperConfig::default());

        insert_keyframe(&store, video, 100.0, BoundingBox::new(100.0, 100.0, 60.0, 40.0)).await;
        let first = grouper.group_camera("cam-a", "vehicle_detection").await.unwrap();
        assert_eq!(first.groups_created, 1);

        // A later batch joins the existing group instead of duplicating it
        insert_keyframe(&store, video, 102.0, BoundingBox::new(103.0, 101.0, 59.0, 40.0)).await;
        let second = grouper.group_camera("cam-a", "vehicle_detection").await.unwrap();
        assert_eq!(second.groups_created, 0);
        assert_eq!(second.predictions_assigned, 1);
    }
}
