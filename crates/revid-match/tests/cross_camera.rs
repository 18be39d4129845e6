//! End-to-end cross-camera matching scenarios over the embedded store.

use std::sync::Arc;
use std::time::Duration;

use revid_match::{
    CrossingLineMatcher, DirectionMatcher, IdentityResolver, ReidTrackMatcher, TopologyCache,
};
use revid_models::{
    AnchorStatus, BoundingBox, ClassTaxonomy, CrossingLine, LinkStatus, MatchWeights, PathSample,
    PredictionTags, PredictionType, SourceTrackType, TopologyEdge, TrajectoryPoint, VideoMetadata,
};
use revid_store::{NewPrediction, NewVideoTrack, Store};

fn weights() -> MatchWeights {
    MatchWeights::default()
}

fn taxonomy() -> ClassTaxonomy {
    ClassTaxonomy::default()
}

async fn topology_cache(store: &Store) -> Arc<TopologyCache> {
    Arc::new(TopologyCache::new(store.clone(), Duration::from_secs(60)))
}

async fn add_edge(store: &Store, a: &str, b: &str, avg: f64, max: f64) {
    store
        .upsert_topology_edge(TopologyEdge {
            camera_a: a.to_string(),
            camera_b: b.to_string(),
            min_transit_seconds: 1.0,
            max_transit_seconds: max,
            avg_transit_seconds: Some(avg),
        })
        .await
        .unwrap();
}

/// Seed an approved camera-object track with one member prediction, an
/// optional embedding, and upstream path data on the member's video.
#[allow(clippy::too_many_arguments)]
async fn seed_track(
    store: &Store,
    camera_id: &str,
    first_seen: f64,
    last_seen: f64,
    subtype: Option<&str>,
    embedding: Option<Vec<f32>>,
    path_dx_positive: Option<bool>,
    bbox: BoundingBox,
) -> i64 {
    let path_data = path_dx_positive.map(|positive| {
        let (x0, x1) = if positive { (0.1, 0.9) } else { (0.9, 0.1) };
        vec![
            PathSample { cx: x0, cy: 0.5, timestamp: first_seen },
            PathSample { cx: x1, cy: 0.5, timestamp: last_seen },
        ]
    });
    let video = store
        .insert_video(
            camera_id,
            format!("{camera_id}_{first_seen}.mp4"),
            1920,
            1080,
            VideoMetadata {
                source_event_id: None,
                path_data,
            },
        )
        .await
        .unwrap();

    let track = store.create_track(camera_id, "vehicle_detection", None).await.unwrap();

    for ts in [first_seen, last_seen] {
        let p = store
            .insert_prediction(NewPrediction {
                video_id: video.id,
                model_name: "det".into(),
                model_version: "1".into(),
                scenario: "vehicle_detection".into(),
                prediction_type: PredictionType::Keyframe,
                confidence: 0.9,
                timestamp: ts,
                end_timestamp: None,
                bbox: Some(bbox),
                predicted_tags: PredictionTags::default(),
                parent_prediction_id: None,
            })
            .await
            .unwrap();
        store.assign_predictions_to_track(&[p.id], track.id).await.unwrap();
    }
    store.recompute_track_stats(track.id).await.unwrap();
    store.set_track_anchor_status(track.id, AnchorStatus::Approved).await.unwrap();
    if let Some(subtype) = subtype {
        store
            .set_track_classification(
                track.id,
                revid_models::AnchorClassification {
                    vehicle_subtype: Some(subtype.to_string()),
                    actual_class: None,
                    classified_by: Some("studio_user".to_string()),
                },
                false,
            )
            .await
            .unwrap();
    }
    if embedding.is_some() {
        store.set_track_descriptors(track.id, None, embedding).await.unwrap();
    }
    track.id
}

/// Trajectory moving horizontally with the given sign.
fn moving_trajectory(positive_dx: bool, n: usize) -> Vec<TrajectoryPoint> {
    (0..n)
        .map(|i| {
            let x = if positive_dx {
                100.0 + i as f64 * 40.0
            } else {
                100.0 + (n - 1 - i) as f64 * 40.0
            };
            TrajectoryPoint {
                timestamp: i as f64 * 0.3,
                x,
                y: 400.0,
                w: 80.0,
                h: 50.0,
                conf: 0.9,
            }
        })
        .collect()
}

async fn seed_video_track(
    store: &Store,
    camera_id: &str,
    first_seen_epoch: f64,
    last_seen_epoch: f64,
    class_name: &str,
    embedding: Vec<f32>,
    positive_dx: bool,
) -> i64 {
    let video = store
        .insert_video(
            camera_id,
            format!("{camera_id}_vt_{first_seen_epoch}.mp4"),
            1920,
            1080,
            VideoMetadata::default(),
        )
        .await
        .unwrap();
    store
        .insert_video_track(NewVideoTrack {
            video_id: video.id,
            camera_id: camera_id.to_string(),
            tracker_track_id: 1,
            class_name: class_name.to_string(),
            trajectory: moving_trajectory(positive_dx, 11),
            first_seen_epoch,
            last_seen_epoch,
            best_crop_path: None,
            reid_embedding: Some(embedding),
        })
        .await
        .unwrap()
        .id
}

/// Unit vectors with a chosen cosine similarity.
fn embedding_pair(cos: f32) -> (Vec<f32>, Vec<f32>) {
    let a = vec![1.0, 0.0];
    let b = vec![cos, (1.0 - cos * cos).sqrt()];
    (a, b)
}

// ---------------------------------------------------------------------------
// Scenario: one vehicle over two cameras, direction matcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direction_matcher_links_same_direction_vehicle() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let (e_a, e_b) = embedding_pair(0.62);
    let bbox = BoundingBox::new(500.0, 400.0, 120.0, 80.0);
    let t_a = seed_track(&store, "gate", 1000.0, 1003.0, Some("pickup truck"), Some(e_a), Some(true), bbox).await;
    let t_b = seed_track(&store, "barn", 1005.0, 1008.0, Some("pickup truck"), Some(e_b), Some(true), bbox).await;

    let matcher = DirectionMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    let summary = matcher.match_all("vehicle").await.unwrap();
    assert_eq!(summary.links_created, 1);

    let links = store.list_links(None).await.unwrap();
    assert_eq!(links.len(), 1);
    let link = &links[0];
    // Link ordering invariant
    assert!(link.track_a_id < link.track_b_id);
    assert_eq!(link.match_method, "direction");
    assert_eq!(link.status, LinkStatus::Auto);
    assert!(link.match_confidence >= 0.40);

    // Identity resolution assigns the minimum track id to both
    let resolver = IdentityResolver::new(store.clone());
    resolver.resolve(SourceTrackType::CameraObject).await.unwrap();

    let identity = t_a.min(t_b);
    assert_eq!(
        store.get_track(t_a).await.unwrap().cross_camera_identity_id,
        Some(identity)
    );
    assert_eq!(
        store.get_track(t_b).await.unwrap().cross_camera_identity_id,
        Some(identity)
    );
}

#[tokio::test]
async fn direction_matcher_rejects_out_of_window_pairs() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let bbox = BoundingBox::new(500.0, 400.0, 120.0, 80.0);
    // B appears 100 s after A: an order of magnitude over max transit
    seed_track(&store, "gate", 1000.0, 1003.0, None, None, Some(true), bbox).await;
    seed_track(&store, "barn", 1100.0, 1103.0, None, None, Some(true), bbox).await;

    let matcher = DirectionMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    let summary = matcher.match_all("vehicle").await.unwrap();
    assert_eq!(summary.links_created, 0);
}

// ---------------------------------------------------------------------------
// Scenario: opposite-direction veto on video tracks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn opposite_directions_are_vetoed() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let (e_a, e_b) = embedding_pair(0.62);
    let t_a = seed_video_track(&store, "gate", 1000.0, 1003.0, "pickup truck", e_a, true).await;
    let t_b = seed_video_track(&store, "barn", 1005.0, 1008.0, "pickup truck", e_b, false).await;

    let matcher = ReidTrackMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    let summary = matcher
        .match_video_tracks_cameras("gate", "barn", "vehicle")
        .await
        .unwrap();
    assert_eq!(summary.links_created, 0);
    assert!(summary.direction_vetoed > 0);

    let resolver = IdentityResolver::new(store.clone());
    resolver.resolve(SourceTrackType::VideoTrack).await.unwrap();
    assert_eq!(store.get_video_track(t_a).await.unwrap().cross_camera_identity_id, None);
    assert_eq!(store.get_video_track(t_b).await.unwrap().cross_camera_identity_id, None);
}

#[tokio::test]
async fn video_track_matcher_links_same_direction_vehicle() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let (e_a, e_b) = embedding_pair(0.62);
    let t_a = seed_video_track(&store, "gate", 1000.0, 1003.0, "pickup truck", e_a, true).await;
    let t_b = seed_video_track(&store, "barn", 1005.0, 1008.0, "pickup truck", e_b, true).await;

    let matcher = ReidTrackMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    let summary = matcher
        .match_video_tracks_cameras("gate", "barn", "vehicle")
        .await
        .unwrap();
    assert_eq!(summary.links_created, 1);

    let link = &store.list_links(None).await.unwrap()[0];
    assert!(link.track_a_id < link.track_b_id);
    assert_eq!(link.source_track_type, SourceTrackType::VideoTrack);
    // Temporal filter invariant: accepted gap is inside the transit window
    assert!(link.temporal_gap_seconds.unwrap() <= 10.0);

    let resolver = IdentityResolver::new(store.clone());
    resolver.resolve(SourceTrackType::VideoTrack).await.unwrap();
    let identity = t_a.min(t_b);
    assert_eq!(
        store.get_video_track(t_a).await.unwrap().cross_camera_identity_id,
        Some(identity)
    );
    assert_eq!(
        store.get_video_track(t_b).await.unwrap().cross_camera_identity_id,
        Some(identity)
    );
}

// ---------------------------------------------------------------------------
// Scenario: crossing-line lane reversal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn crossing_line_reversed_lane_mapping_scores_full() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    // Track A projects to t=0.2 on its line, track B to t=0.8 on its line;
    // with reversed lane mapping they are the same lane
    let bbox_a = BoundingBox::new(0.0, 30.0, 40.0, 40.0); // center (20, 50)
    let bbox_b = BoundingBox::new(60.0, 30.0, 40.0, 40.0); // center (80, 50)
    let t_a = seed_track(&store, "gate", 1000.0, 1002.0, None, None, None, bbox_a).await;
    let t_b = seed_track(&store, "barn", 1000.0, 1002.0, None, None, None, bbox_b).await;

    let line = |camera: &str| CrossingLine {
        id: 0,
        camera_id: camera.to_string(),
        line_name: format!("{camera}-gateline"),
        x1: 0.0,
        y1: 0.0,
        x2: 100.0,
        y2: 0.0,
        forward_dx: 0.0,
        forward_dy: 1.0,
        paired_line_id: None,
        lane_mapping_reversed: false,
    };
    let line_a = store.create_crossing_line(line("gate")).await.unwrap();
    let line_b = store.create_crossing_line(line("barn")).await.unwrap();
    store.pair_crossing_lines(line_a.id, line_b.id, true).await.unwrap();

    let matcher = CrossingLineMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    let summary = matcher.match_all("vehicle").await.unwrap();
    assert_eq!(summary.links_created, 1);

    let link = &store.list_links(None).await.unwrap()[0];
    assert_eq!(link.match_method, "crossing_line");
    // Reversal makes the effective lane distance zero
    assert!(link.lane_distance.unwrap() < 1e-9);
    assert_eq!(link.crossing_line_id, Some(line_a.id));
    // Lane 0.50 + temporal 0.35 + size 0.15 = 1.0: auto-confirmed
    assert_eq!(link.status, LinkStatus::AutoConfirmed);
    assert_eq!(
        (link.track_a_id, link.track_b_id),
        (t_a.min(t_b), t_a.max(t_b))
    );
}

// ---------------------------------------------------------------------------
// Identity resolution properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identity_resolution_is_idempotent() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let (e_a, e_b) = embedding_pair(0.70);
    seed_video_track(&store, "gate", 1000.0, 1003.0, "SUV", e_a.clone(), true).await;
    seed_video_track(&store, "barn", 1005.0, 1008.0, "SUV", e_b, true).await;
    seed_video_track(&store, "gate", 2000.0, 2003.0, "sedan", e_a, true).await;

    let matcher = ReidTrackMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    matcher
        .match_video_tracks_cameras("gate", "barn", "vehicle")
        .await
        .unwrap();

    async fn snapshot(store: &Store) -> Vec<(i64, Option<i64>)> {
        let mut out = Vec::new();
        for cam in ["gate", "barn"] {
            for t in store.list_active_video_tracks_for_camera(cam).await.unwrap() {
                out.push((t.id, t.cross_camera_identity_id));
            }
        }
        out.sort();
        out
    }

    let resolver = IdentityResolver::new(store.clone());
    resolver.resolve(SourceTrackType::VideoTrack).await.unwrap();
    let first = snapshot(&store).await;
    resolver.resolve(SourceTrackType::VideoTrack).await.unwrap();
    let second = snapshot(&store).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn rejected_link_drops_identity() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let (e_a, e_b) = embedding_pair(0.70);
    let t_a = seed_video_track(&store, "gate", 1000.0, 1003.0, "SUV", e_a, true).await;
    let t_b = seed_video_track(&store, "barn", 1005.0, 1008.0, "SUV", e_b, true).await;

    let matcher = ReidTrackMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    matcher
        .match_video_tracks_cameras("gate", "barn", "vehicle")
        .await
        .unwrap();

    let resolver = IdentityResolver::new(store.clone());
    resolver.resolve(SourceTrackType::VideoTrack).await.unwrap();
    assert!(store.get_video_track(t_a).await.unwrap().cross_camera_identity_id.is_some());

    // Reviewer rejects the link; the next resolve clears both identities
    let link = store.list_links(None).await.unwrap().remove(0);
    store
        .set_link_status(link.id, LinkStatus::Rejected, Some("reviewer"), Some("different trucks"))
        .await
        .unwrap();
    resolver.resolve(SourceTrackType::VideoTrack).await.unwrap();

    assert_eq!(store.get_video_track(t_a).await.unwrap().cross_camera_identity_id, None);
    assert_eq!(store.get_video_track(t_b).await.unwrap().cross_camera_identity_id, None);
}

#[tokio::test]
async fn classification_conflict_is_hard_veto() {
    let store = Store::new();
    add_edge(&store, "gate", "barn", 4.0, 10.0).await;

    let (e_a, e_b) = embedding_pair(0.70);
    // sedan vs box truck: different compatibility groups
    seed_video_track(&store, "gate", 1000.0, 1003.0, "sedan", e_a, true).await;
    seed_video_track(&store, "barn", 1005.0, 1008.0, "box truck", e_b, true).await;

    let matcher = ReidTrackMatcher::new(
        store.clone(),
        topology_cache(&store).await,
        weights(),
        taxonomy(),
    );
    let summary = matcher
        .match_video_tracks_cameras("gate", "barn", "vehicle")
        .await
        .unwrap();
    assert_eq!(summary.links_created, 0);
}
