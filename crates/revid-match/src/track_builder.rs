//! Track builder: promotes prediction groups to camera object tracks and
//! propagates anchor review decisions across members.

use revid_models::{
    AnchorClassification, AnchorStatus, Prediction, PredictionId, PredictionTags, ReviewStatus,
    TrackId,
};
use revid_store::Store;
use tracing::{debug, info};

use crate::error::{MatchError, MatchResult};
use crate::grouper::{ClusterAggregate, GrouperConfig};

/// Operator decision for a conflicted track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDecision {
    Approve,
    Reject,
}

/// Summary of a track-building batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub tracks_created: usize,
    pub predictions_attached: usize,
}

/// Summary of a decision-propagation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagateSummary {
    pub applied: usize,
    pub conflicts: usize,
}

/// The track builder.
pub struct TrackBuilder {
    store: Store,
    config: GrouperConfig,
}

impl TrackBuilder {
    pub fn new(store: Store, config: GrouperConfig) -> Self {
        Self { store, config }
    }

    /// Promote grouped predictions to camera object tracks.
    ///
    /// Uses the same spatial matching as grouping but over the longer track
    /// horizon: a group whose members are unattached either joins a matching
    /// existing track or becomes a new one.
    pub async fn build_tracks(&self, camera_id: &str, scenario: &str) -> MatchResult<BuildSummary> {
        let mut summary = BuildSummary::default();

        // Live aggregates for the camera's existing tracks
        let mut track_aggs: Vec<(TrackId, ClusterAggregate)> = self
            .store
            .list_tracks(camera_id, scenario)
            .await?
            .into_iter()
            .map(|t| {
                (
                    t.id,
                    ClusterAggregate {
                        centroid_x: t.bbox_centroid_x,
                        centroid_y: t.bbox_centroid_y,
                        avg_w: t.avg_bbox_width,
                        avg_h: t.avg_bbox_height,
                        min_ts: t.first_seen,
                        max_ts: t.last_seen,
                        count: t.member_count,
                    },
                )
            })
            .collect();

        let mut touched: Vec<TrackId> = Vec::new();
        for status in [ReviewStatus::Pending, ReviewStatus::Approved] {
            for group in self.store.list_groups(camera_id, scenario, status).await? {
                let members = self.store.list_group_members(group.id).await?;
                let unattached: Vec<&Prediction> = members
                    .iter()
                    .filter(|p| p.camera_object_track_id.is_none())
                    .collect();
                if unattached.is_empty() {
                    continue;
                }

                // Match the group against existing tracks via its first
                // unattached member
                let probe = unattached[0];
                let matched = track_aggs
                    .iter_mut()
                    .find(|(_, agg)| agg.accepts(probe, &self.config, self.config.track_time_gap_sec));

                let track_id = match matched {
                    Some((id, agg)) => {
                        for p in &unattached {
                            agg.absorb(p);
                        }
                        *id
                    }
                    None => {
                        let track = self
                            .store
                            .create_track(camera_id, scenario, Some(group.id))
                            .await?;
                        if let Some(agg) = ClusterAggregate::from_prediction(probe) {
                            track_aggs.push((track.id, agg));
                        }
                        summary.tracks_created += 1;
                        track.id
                    }
                };

                let ids: Vec<PredictionId> = unattached.iter().map(|p| p.id).collect();
                self.store.assign_predictions_to_track(&ids, track_id).await?;
                summary.predictions_attached += ids.len();
                touched.push(track_id);
            }
        }

        touched.sort_unstable();
        touched.dedup();
        for track_id in &touched {
            self.store.recompute_track_stats(*track_id).await?;
            self.inherit_anchor_decision(*track_id).await?;
        }

        info!(
            camera_id,
            scenario,
            tracks_created = summary.tracks_created,
            attached = summary.predictions_attached,
            "Track building complete"
        );
        Ok(summary)
    }

    /// Attach a batch of new predictions to existing tracks. Predictions
    /// that match no track are left for the next grouping pass.
    pub async fn match_new_predictions(&self, ids: &[PredictionId]) -> MatchResult<BuildSummary> {
        let mut summary = BuildSummary::default();
        let predictions = self.store.get_predictions(ids).await?;

        for p in &predictions {
            if p.camera_object_track_id.is_some() || p.bbox.is_none() {
                continue;
            }
            let video = self.store.get_video(p.video_id).await?;
            let tracks = self.store.list_tracks(&video.camera_id, &p.scenario).await?;

            let matched = tracks.iter().find(|t| {
                let agg = ClusterAggregate {
                    centroid_x: t.bbox_centroid_x,
                    centroid_y: t.bbox_centroid_y,
                    avg_w: t.avg_bbox_width,
                    avg_h: t.avg_bbox_height,
                    min_ts: t.first_seen,
                    max_ts: t.last_seen,
                    count: t.member_count,
                };
                agg.accepts(p, &self.config, self.config.track_time_gap_sec)
            });

            let Some(track) = matched else {
                debug!(prediction_id = p.id, "No track match for new prediction");
                continue;
            };

            self.store.assign_predictions_to_track(&[p.id], track.id).await?;
            summary.predictions_attached += 1;

            // A decided anchor routes the new member immediately
            if track.anchor_status.is_decided() {
                let status = match track.anchor_status {
                    AnchorStatus::Approved => ReviewStatus::AutoApproved,
                    AnchorStatus::Rejected => ReviewStatus::AutoRejected,
                    _ => unreachable!("is_decided covers approved/rejected"),
                };
                self.store.set_review_status(p.id, status, Some("track_builder")).await?;
                if let Some(subtype) = track.vehicle_subtype() {
                    self.store
                        .set_corrected_tags(
                            p.id,
                            PredictionTags {
                                vehicle_subtype: Some(subtype.to_string()),
                                classified_by: Some("track_inheritance".to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }

            self.store.recompute_track_stats(track.id).await?;
        }

        Ok(summary)
    }

    /// Apply every reviewed anchor's decision to its still-pending members.
    ///
    /// A track whose members carry contradictory human reviews is marked
    /// `conflict` instead. With `dry_run` nothing is written; the summary
    /// reports what would happen.
    pub async fn propagate_decisions(
        &self,
        camera_id: &str,
        scenario: &str,
        dry_run: bool,
    ) -> MatchResult<PropagateSummary> {
        let mut summary = PropagateSummary::default();

        for track in self.store.list_tracks(camera_id, scenario).await? {
            let members = self.store.list_track_members(track.id).await?;
            let human_approved = members.iter().any(|p| p.review_status == ReviewStatus::Approved);
            let human_rejected = members.iter().any(|p| p.review_status == ReviewStatus::Rejected);

            if human_approved && human_rejected {
                summary.conflicts += 1;
                if !dry_run && track.anchor_status != AnchorStatus::Conflict {
                    self.store
                        .set_track_anchor_status(track.id, AnchorStatus::Conflict)
                        .await?;
                }
                continue;
            }

            let decision = if human_approved {
                Some((AnchorStatus::Approved, ReviewStatus::AutoApproved))
            } else if human_rejected {
                Some((AnchorStatus::Rejected, ReviewStatus::AutoRejected))
            } else {
                None
            };
            let Some((anchor_status, member_status)) = decision else {
                continue;
            };

            let pending: Vec<&Prediction> = members
                .iter()
                .filter(|p| p.review_status == ReviewStatus::Pending)
                .collect();

            if dry_run {
                summary.applied += pending.len();
                continue;
            }

            if track.anchor_status != anchor_status {
                self.store.set_track_anchor_status(track.id, anchor_status).await?;
            }
            for p in pending {
                self.store
                    .set_review_status(p.id, member_status, Some("anchor_propagation"))
                    .await?;
                summary.applied += 1;
            }
        }

        info!(
            camera_id,
            dry_run,
            applied = summary.applied,
            conflicts = summary.conflicts,
            "Decision propagation complete"
        );
        Ok(summary)
    }

    /// Operator resolution for a conflicted track: rewrite every member to
    /// the chosen outcome.
    pub async fn resolve_conflict(
        &self,
        track_id: TrackId,
        decision: TrackDecision,
        vehicle_subtype: Option<&str>,
        actual_class: Option<&str>,
    ) -> MatchResult<usize> {
        let track = self.store.get_track(track_id).await?;
        if track.anchor_status != AnchorStatus::Conflict {
            return Err(MatchError::internal(format!(
                "track {track_id} is not in conflict (status {})",
                track.anchor_status.as_str()
            )));
        }

        let (anchor_status, member_status) = match decision {
            TrackDecision::Approve => (AnchorStatus::Approved, ReviewStatus::Approved),
            TrackDecision::Reject => (AnchorStatus::Rejected, ReviewStatus::Rejected),
        };

        let members = self.store.list_track_members(track_id).await?;
        for p in &members {
            self.store
                .set_review_status(p.id, member_status, Some("conflict_resolution"))
                .await?;
            if decision == TrackDecision::Approve {
                if let Some(subtype) = vehicle_subtype {
                    self.store
                        .set_corrected_tags(
                            p.id,
                            PredictionTags {
                                vehicle_subtype: Some(subtype.to_string()),
                                class: actual_class.map(String::from),
                                classified_by: Some("conflict_resolution".to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
        }

        self.store.set_track_anchor_status(track_id, anchor_status).await?;
        self.store
            .set_track_classification(
                track_id,
                AnchorClassification {
                    vehicle_subtype: vehicle_subtype.map(String::from),
                    actual_class: actual_class.map(String::from),
                    classified_by: Some("conflict_resolution".to_string()),
                },
                false,
            )
            .await?;

        Ok(members.len())
    }

    /// Derive the anchor decision for a freshly built track from the human
    /// reviews already on its members.
    async fn inherit_anchor_decision(&self, track_id: TrackId) -> MatchResult<()> {
        let members = self.store.list_track_members(track_id).await?;
        let approved = members.iter().any(|p| p.review_status == ReviewStatus::Approved);
        let rejected = members.iter().any(|p| p.review_status == ReviewStatus::Rejected);

        let status = match (approved, rejected) {
            (true, true) => AnchorStatus::Conflict,
            (true, false) => AnchorStatus::Approved,
            (false, true) => AnchorStatus::Rejected,
            (false, false) => return Ok(()),
        };
        self.store.set_track_anchor_status(track_id, status).await?;

        // Carry the first human subtype up to the track
        if status == AnchorStatus::Approved {
            let subtype = members.iter().find_map(|p| p.vehicle_subtype().map(String::from));
            if let Some(subtype) = subtype {
                self.store
                    .set_track_classification(
                        track_id,
                        AnchorClassification {
                            vehicle_subtype: Some(subtype),
                            actual_class: None,
                            classified_by: Some("anchor_inheritance".to_string()),
                        },
                        false,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revid_models::{BoundingBox, PredictionType, VideoMetadata};
    use revid_store::NewPrediction;

    use crate::grouper::PredictionGrouper;

    async fn setup() -> (Store, i64) {
        let store = Store::new();
        let video = store
            .insert_video("cam-a", "clip.mp4", 1920, 1080, VideoMetadata::default())
            .await
            .unwrap();
        (store, video.id)
    }

    async fn keyframe(store: &Store, video_id: i64, ts: f64, x: f64) -> Prediction {
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
                bbox: Some(BoundingBox::new(x, 100.0, 60.0, 40.0)),
                predicted_tags: PredictionTags::default(),
                parent_prediction_id: None,
            })
            .await
            .unwrap()
    }

    async fn grouped_store() -> (Store, TrackBuilder) {
        let (store, video) = setup().await;
        keyframe(&store, video, 100.0, 100.0).await;
        keyframe(&store, video, 101.0, 104.0).await;

        let grouper = PredictionGrouper::new(store.clone(), GrouperConfig::default());
        grouper.group_camera("cam-a", "vehicle_detection").await.unwrap();

        let builder = TrackBuilder::new(store.clone(), GrouperConfig::default());
        (store, builder)
    }

    #[tokio::test]
    async fn test_build_tracks_from_groups() {
        let (store, builder) = grouped_store().await;
        let summary = builder.build_tracks("cam-a", "vehicle_detection").await.unwrap();
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.predictions_attached, 2);

        let tracks = store.list_tracks("cam-a", "vehicle_detection").await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].member_count, 2);
        assert_eq!(tracks[0].first_seen, 100.0);
        assert_eq!(tracks[0].last_seen, 101.0);
    }

    #[tokio::test]
    async fn test_new_prediction_inherits_anchor_decision() {
        let (store, builder) = grouped_store().await;
        builder.build_tracks("cam-a", "vehicle_detection").await.unwrap();
        let track = store.list_tracks("cam-a", "vehicle_detection").await.unwrap().remove(0);
        store
            .set_track_anchor_status(track.id, AnchorStatus::Approved)
            .await
            .unwrap();
        store
            .set_track_classification(
                track.id,
                AnchorClassification {
                    vehicle_subtype: Some("pickup truck".into()),
                    actual_class: None,
                    classified_by: Some("studio_user".into()),
                },
                false,
            )
            .await
            .unwrap();

        // New prediction lands near the track
        let video = store.find_video_by_filename("clip.mp4").await.unwrap().unwrap();
        let p = keyframe(&store, video.id, 103.0, 102.0).await;
        store
            .set_review_status(p.id, ReviewStatus::Pending, None)
            .await
            .unwrap();

        let summary = builder.match_new_predictions(&[p.id]).await.unwrap();
        assert_eq!(summary.predictions_attached, 1);

        let p = store.get_prediction(p.id).await.unwrap();
        assert_eq!(p.review_status, ReviewStatus::AutoApproved);
        assert_eq!(p.camera_object_track_id, Some(track.id));
        assert_eq!(
            p.corrected_tags.unwrap().vehicle_subtype.as_deref(),
            Some("pickup truck")
        );
    }

    #[tokio::test]
    async fn test_propagate_decisions_and_conflict() {
        let (store, builder) = grouped_store().await;
        builder.build_tracks("cam-a", "vehicle_detection").await.unwrap();
        let track = store.list_tracks("cam-a", "vehicle_detection").await.unwrap().remove(0);
        let members = store.list_track_members(track.id).await.unwrap();

        // One human approval, one pending member
        store
            .set_review_status(members[0].id, ReviewStatus::Approved, Some("reviewer"))
            .await
            .unwrap();
        store
            .set_review_status(members[1].id, ReviewStatus::Pending, None)
            .await
            .unwrap();

        // Dry run reports but does not write
        let dry = builder
            .propagate_decisions("cam-a", "vehicle_detection", true)
            .await
            .unwrap();
        assert_eq!(dry.applied, 1);
        let still_pending = store.get_prediction(members[1].id).await.unwrap();
        assert_eq!(still_pending.review_status, ReviewStatus::Pending);

        let wet = builder
            .propagate_decisions("cam-a", "vehicle_detection", false)
            .await
            .unwrap();
        assert_eq!(wet.applied, 1);
        let applied = store.get_prediction(members[1].id).await.unwrap();
        assert_eq!(applied.review_status, ReviewStatus::AutoApproved);

        // Contradictory human reviews mark the track conflicted
        store
            .set_review_status(members[1].id, ReviewStatus::Rejected, Some("other_reviewer"))
            .await
            .unwrap();
        let conflicted = builder
            .propagate_decisions("cam-a", "vehicle_detection", false)
            .await
            .unwrap();
        assert_eq!(conflicted.conflicts, 1);
        let track = store.get_track(track.id).await.unwrap();
        assert_eq!(track.anchor_status, AnchorStatus::Conflict);
    }

    #[tokio::test]
    async fn test_resolve_conflict_rewrites_members() {
        let (store, builder) = grouped_store().await;
        builder.build_tracks("cam-a", "vehicle_detection").await.unwrap();
        let track = store.list_tracks("cam-a", "vehicle_detection").await.unwrap().remove(0);
        let members = store.list_track_members(track.id).await.unwrap();
        store
            .set_review_status(members[0].id, ReviewStatus::Approved, Some("a"))
            .await
            .unwrap();
        store
            .set_review_status(members[1].id, ReviewStatus::Rejected, Some("b"))
            .await
            .unwrap();
        builder
            .propagate_decisions("cam-a", "vehicle_detection", false)
            .await
            .unwrap();

        let rewritten = builder
            .resolve_conflict(track.id, TrackDecision::Approve, Some("SUV"), Some("car"))
            .await
            .unwrap();
        assert_eq!(rewritten, 2);

        let track = store.get_track(track.id).await.unwrap();
        assert_eq!(track.anchor_status, AnchorStatus::Approved);
        assert_eq!(track.vehicle_subtype(), Some("SUV"));
        for p in store.list_track_members(track.id).await.unwrap() {
            assert_eq!(p.review_status, ReviewStatus::Approved);
            assert_eq!(p.vehicle_subtype(), Some("SUV"));
        }
    }
}
