//! Track post-processing: merge overlapping tracks, stitch sequential
//! fragments, clean trajectory jumps.
//!
//! The three passes run in strict order over one clip's active tracks; each
//! pass reads the previous pass's output. The functions here are pure over
//! track rows; the engine persists their outcomes.

use std::collections::{HashMap, HashSet};

use revid_models::{AnalysisConfig, TrajectoryPoint, VideoTrack, VideoTrackId};
use tracing::info;

/// Trajectory rewrites and deactivations produced by the jump-clean pass.
#[derive(Debug, Default)]
pub struct JumpCleanOutcome {
    /// Tracks whose longest segment was too short; deactivate entirely
    pub deactivate: Vec<VideoTrackId>,
    /// Tracks whose trajectory was trimmed to the longest segment
    pub cleaned: Vec<(VideoTrackId, Vec<TrajectoryPoint>)>,
}

/// Timestamp key rounded to 2 decimals, for shared-timestamp lookup.
fn ts_key(ts: f64) -> i64 {
    (ts * 100.0).round() as i64
}

struct Parsed<'a> {
    track: &'a VideoTrack,
    by_time: HashMap<i64, &'a TrajectoryPoint>,
    t_min: f64,
    t_max: f64,
}

impl<'a> Parsed<'a> {
    fn new(track: &'a VideoTrack) -> Self {
        let mut by_time = HashMap::new();
        for pt in &track.trajectory {
            by_time.insert(ts_key(pt.timestamp), pt);
        }
        let t_min = track.trajectory.first().map(|p| p.timestamp).unwrap_or(0.0);
        let t_max = track.trajectory.last().map(|p| p.timestamp).unwrap_or(0.0);
        Self {
            track,
            by_time,
            t_min,
            t_max,
        }
    }

    fn len(&self) -> usize {
        self.track.trajectory.len()
    }

    /// Point at a rounded timestamp, tolerating +-0.07 s of jitter.
    fn point_near(&self, key: i64) -> Option<&TrajectoryPoint> {
        self.by_time
            .get(&key)
            .or_else(|| self.by_time.get(&(key + 7)))
            .or_else(|| self.by_time.get(&(key - 7)))
            .copied()
    }
}

/// Pass (a): merge tracks that overlap in space and time.
///
/// The tracker can emit multiple ids for one object when the detector
/// produces overlapping boxes. Pairs whose mean IoU over shared timestamps
/// reaches the threshold keep only the longer track; a second
/// nearest-neighbour pass with the IoU-min denominator catches objects whose
/// bbox size oscillates. Returns the ids to deactivate.
pub fn merge_overlapping_tracks(tracks: &[VideoTrack], config: &AnalysisConfig) -> Vec<VideoTrackId> {
    if tracks.len() < 2 {
        return Vec::new();
    }

    let parsed: Vec<Parsed> = tracks.iter().map(Parsed::new).collect();
    let mut removed: HashSet<usize> = HashSet::new();

    for i in 0..parsed.len() {
        if removed.contains(&i) {
            continue;
        }
        for j in (i + 1)..parsed.len() {
            if removed.contains(&j) || removed.contains(&i) {
                continue;
            }

            let overlap_start = parsed[i].t_min.max(parsed[j].t_min);
            let overlap_end = parsed[i].t_max.min(parsed[j].t_max);
            let overlap_duration = (overlap_end - overlap_start).max(0.0);

            // Shared-timestamp IoU sequence
            let mut ious = Vec::new();
            for (key, pt_i) in &parsed[i].by_time {
                if let Some(pt_j) = parsed[j].point_near(*key) {
                    ious.push(pt_i.bbox().iou(&pt_j.bbox()));
                }
            }

            // Long temporal overlap relaxes the shared-point requirement
            let min_pts = if overlap_duration > 5.0 { 1 } else { config.min_shared_points };

            if ious.len() >= min_pts {
                let avg_iou = ious.iter().sum::<f64>() / ious.len() as f64;
                if avg_iou >= config.iou_merge_threshold {
                    let victim = if parsed[i].len() >= parsed[j].len() { j } else { i };
                    let keeper = if victim == j { i } else { j };
                    info!(
                        victim = parsed[victim].track.id,
                        keeper = parsed[keeper].track.id,
                        avg_iou,
                        shared = ious.len(),
                        "Merging overlapping track"
                    );
                    removed.insert(victim);
                    continue;
                }
            }

            // Second pass: sampled nearest-neighbour IoU-min
            if overlap_duration >= 2.0 {
                let sample_count = 9;
                let mut nn_ious = Vec::new();
                for k in 0..sample_count {
                    let ts = overlap_start
                        + k as f64 * (overlap_end - overlap_start) / (sample_count - 1) as f64;
                    let pt_i = revid_models::geometry::nearest_point(&parsed[i].track.trajectory, ts, 0.5);
                    let pt_j = revid_models::geometry::nearest_point(&parsed[j].track.trajectory, ts, 0.5);
                    if let (Some(a), Some(b)) = (pt_i, pt_j) {
                        nn_ious.push(a.bbox().iou_min(&b.bbox()));
                    }
                }
                if nn_ious.len() >= 3 {
                    let avg = nn_ious.iter().sum::<f64>() / nn_ious.len() as f64;
                    if avg >= config.iou_min_nearest {
                        let victim = if parsed[i].len() >= parsed[j].len() { j } else { i };
                        let keeper = if victim == j { i } else { j };
                        info!(
                            victim = parsed[victim].track.id,
                            keeper = parsed[keeper].track.id,
                            avg_iou_min = avg,
                            samples = nn_ious.len(),
                            "Merging oscillating track"
                        );
                        removed.insert(victim);
                    }
                }
            }
        }
    }

    removed.into_iter().map(|idx| parsed[idx].track.id).collect()
}

/// Pass (b): stitch sequential fragments of the same object.
///
/// The tracker drops a track when detection confidence dips, then
/// re-acquires the object under a new id. When track *j* begins within
/// `stitch_max_gap_sec` of track *i* ending and the boundary bboxes overlap,
/// the shorter of the two is deactivated. Catches stationary or slow-moving
/// objects that fragment into short segments.
pub fn stitch_sequential_tracks(tracks: &[VideoTrack], config: &AnalysisConfig) -> Vec<VideoTrackId> {
    if tracks.len() < 2 {
        return Vec::new();
    }

    let parsed: Vec<Parsed> = tracks.iter().map(Parsed::new).collect();
    let mut removed: HashSet<usize> = HashSet::new();

    for i in 0..parsed.len() {
        if removed.contains(&i) || parsed[i].track.trajectory.is_empty() {
            continue;
        }
        for j in 0..parsed.len() {
            if j == i || removed.contains(&j) || removed.contains(&i) {
                continue;
            }
            let Some(last_i) = parsed[i].track.trajectory.last() else {
                continue;
            };
            let Some(first_j) = parsed[j].track.trajectory.first() else {
                continue;
            };

            let gap = parsed[j].t_min - parsed[i].t_max;
            if gap < 0.0 || gap > config.stitch_max_gap_sec {
                continue;
            }

            let a = last_i.bbox();
            let b = first_j.bbox();
            let iou = a.iou(&b).max(a.iou_min(&b));
            if iou >= config.stitch_iou_threshold {
                let victim = if parsed[i].len() >= parsed[j].len() { j } else { i };
                let keeper = if victim == j { i } else { j };
                info!(
                    victim = parsed[victim].track.id,
                    keeper = parsed[keeper].track.id,
                    gap,
                    iou,
                    "Stitching sequential track fragment"
                );
                removed.insert(victim);
            }
        }
    }

    removed.into_iter().map(|idx| parsed[idx].track.id).collect()
}

/// Pass (c): remove sudden spatial jumps from trajectories.
///
/// The tracker can associate detections from two distant positions into one
/// track (alternating between a real vehicle and a false positive). A jump
/// is a consecutive-frame centroid displacement over `jump_multiplier` times
/// the average bbox diagonal; the trajectory is split at each jump and only
/// the longest contiguous segment survives. Tracks whose longest segment has
/// fewer than `min_segment_frames` points are deactivated.
pub fn clean_trajectory_jumps(tracks: &[VideoTrack], config: &AnalysisConfig) -> JumpCleanOutcome {
    let mut outcome = JumpCleanOutcome::default();

    for track in tracks {
        let traj = &track.trajectory;
        if traj.len() < 2 {
            continue;
        }

        let mut jump_indices = Vec::new();
        for i in 1..traj.len() {
            let prev = &traj[i - 1];
            let curr = &traj[i];

            let (pcx, pcy) = prev.center();
            let (ccx, ccy) = curr.center();
            let displacement = ((ccx - pcx).powi(2) + (ccy - pcy).powi(2)).sqrt();

            let avg_diag = (prev.bbox().diagonal() + curr.bbox().diagonal()) / 2.0;
            if avg_diag > 0.0 && displacement > avg_diag * config.jump_multiplier {
                jump_indices.push(i);
            }
        }

        if jump_indices.is_empty() {
            continue;
        }

        // Split at the jumps and keep the longest (first wins ties)
        let mut segments: Vec<&[TrajectoryPoint]> = Vec::new();
        let mut start = 0;
        for &ji in &jump_indices {
            segments.push(&traj[start..ji]);
            start = ji;
        }
        segments.push(&traj[start..]);

        let mut longest: &[TrajectoryPoint] = segments[0];
        for seg in &segments[1..] {
            if seg.len() > longest.len() {
                longest = seg;
            }
        }

        if longest.len() < config.min_segment_frames {
            info!(
                track_id = track.id,
                segments = segments.len(),
                longest = longest.len(),
                "Trajectory too fragmented after jump removal, deactivating"
            );
            outcome.deactivate.push(track.id);
            continue;
        }

        let removed = traj.len() - longest.len();
        if removed > 0 {
            info!(
                track_id = track.id,
                removed,
                segments = segments.len(),
                kept = longest.len(),
                "Removed jump-outlier points"
            );
            outcome.cleaned.push((track.id, longest.to_vec()));
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use revid_models::VideoTrackStatus;

    fn track(id: VideoTrackId, points: Vec<(f64, f64, f64, f64, f64)>) -> VideoTrack {
        let trajectory: Vec<TrajectoryPoint> = points
            .into_iter()
            .map(|(ts, x, y, w, h)| TrajectoryPoint {
                timestamp: ts,
                x,
                y,
                w,
                h,
                conf: 0.8,
            })
            .collect();
        let first = trajectory.first().map(|p| p.timestamp).unwrap_or(0.0);
        let last = trajectory.last().map(|p| p.timestamp).unwrap_or(0.0);
        let mut t = VideoTrack {
            id,
            video_id: 1,
            camera_id: "cam-a".into(),
            tracker_track_id: id as u32,
            class_name: "car".into(),
            trajectory,
            first_seen_epoch: 1000.0 + first,
            last_seen_epoch: 1000.0 + last,
            best_crop_path: None,
            avg_confidence: 0.0,
            avg_bbox_width: 0.0,
            avg_bbox_height: 0.0,
            reid_embedding: None,
            status: VideoTrackStatus::Active,
            cross_camera_identity_id: None,
        };
        t.refresh_aggregates();
        t
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_merge_deactivates_shorter_overlap() {
        // Two tracks sharing most timestamps with high IoU; shorter one goes
        let long: Vec<_> = (0..10).map(|i| (i as f64 * 0.1, 100.0, 100.0, 50.0, 50.0)).collect();
        let short: Vec<_> = (0..8).map(|i| (i as f64 * 0.1, 102.0, 101.0, 50.0, 50.0)).collect();
        let tracks = vec![track(1, long), track(2, short)];

        let removed = merge_overlapping_tracks(&tracks, &config());
        assert_eq!(removed, vec![2]);
    }

    #[test]
    fn test_merge_never_increases_active_count() {
        let a: Vec<_> = (0..10).map(|i| (i as f64 * 0.1, 100.0, 100.0, 50.0, 50.0)).collect();
        let b: Vec<_> = (0..10).map(|i| (i as f64 * 0.1, 500.0, 500.0, 50.0, 50.0)).collect();
        let tracks = vec![track(1, a), track(2, b)];

        let removed = merge_overlapping_tracks(&tracks, &config());
        assert!(removed.len() <= tracks.len());
        // Disjoint tracks are untouched
        assert!(removed.is_empty());
    }

    #[test]
    fn test_merge_relaxes_shared_points_for_long_overlap() {
        // Only one shared rounded timestamp, but a 6-second temporal overlap
        let a = vec![
            (0.0, 100.0, 100.0, 50.0, 50.0),
            (3.0, 100.0, 100.0, 50.0, 50.0),
            (6.0, 100.0, 100.0, 50.0, 50.0),
        ];
        let b = vec![
            (0.0, 101.0, 100.0, 50.0, 50.0),
            (6.2, 300.0, 100.0, 50.0, 50.0),
        ];
        let tracks = vec![track(1, a), track(2, b)];
        let removed = merge_overlapping_tracks(&tracks, &config());
        assert_eq!(removed, vec![2]);
    }

    #[test]
    fn test_stitch_sequential_fragments() {
        // Track 2 starts 1s after track 1 ends, at nearly the same box
        let a: Vec<_> = (0..10).map(|i| (i as f64 * 0.1, 100.0, 100.0, 50.0, 50.0)).collect();
        let b: Vec<_> = (0..5).map(|i| (1.9 + i as f64 * 0.1, 103.0, 100.0, 50.0, 50.0)).collect();
        let tracks = vec![track(1, a), track(2, b)];

        let removed = stitch_sequential_tracks(&tracks, &config());
        assert_eq!(removed, vec![2]);
    }

    #[test]
    fn test_stitch_respects_gap_limit() {
        let a: Vec<_> = (0..10).map(|i| (i as f64 * 0.1, 100.0, 100.0, 50.0, 50.0)).collect();
        // Starts 5s after the first ends: over the 3s stitch window
        let b: Vec<_> = (0..5).map(|i| (5.9 + i as f64 * 0.1, 103.0, 100.0, 50.0, 50.0)).collect();
        let tracks = vec![track(1, a), track(2, b)];

        assert!(stitch_sequential_tracks(&tracks, &config()).is_empty());
    }

    #[test]
    fn test_jump_clean_keeps_longest_segment() {
        // 30 contiguous frames, one frame 500px away, 4 frames back: keep 30.
        // Boxes are ~42px diagonal, so 500px is far over 3 diagonals.
        let mut pts: Vec<_> = (0..30).map(|i| (i as f64 * 0.1, 100.0, 100.0, 40.0, 12.0)).collect();
        pts.push((3.0, 600.0, 100.0, 40.0, 12.0));
        for i in 0..4 {
            pts.push((3.1 + i as f64 * 0.1, 100.0, 100.0, 40.0, 12.0));
        }
        let tracks = vec![track(1, pts)];

        let outcome = clean_trajectory_jumps(&tracks, &config());
        assert!(outcome.deactivate.is_empty());
        assert_eq!(outcome.cleaned.len(), 1);
        let (id, cleaned) = &outcome.cleaned[0];
        assert_eq!(*id, 1);
        assert_eq!(cleaned.len(), 30);

        // Cleaning safety: every surviving consecutive displacement is small
        for w in cleaned.windows(2) {
            let (ax, ay) = w[0].center();
            let (bx, by) = w[1].center();
            let disp = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
            let avg_diag = (w[0].bbox().diagonal() + w[1].bbox().diagonal()) / 2.0;
            assert!(disp <= avg_diag * config().jump_multiplier);
        }
    }

    #[test]
    fn test_jump_clean_deactivates_shredded_track() {
        // Every frame jumps: longest segment is a single point
        let pts: Vec<_> = (0..6)
            .map(|i| (i as f64 * 0.1, if i % 2 == 0 { 0.0 } else { 1000.0 }, 100.0, 30.0, 30.0))
            .collect();
        let tracks = vec![track(7, pts)];

        let outcome = clean_trajectory_jumps(&tracks, &config());
        assert_eq!(outcome.deactivate, vec![7]);
        assert!(outcome.cleaned.is_empty());
    }

    #[test]
    fn test_jump_clean_leaves_smooth_tracks_alone() {
        let pts: Vec<_> = (0..20).map(|i| (i as f64 * 0.1, 100.0 + i as f64 * 5.0, 100.0, 40.0, 40.0)).collect();
        let tracks = vec![track(3, pts)];

        let outcome = clean_trajectory_jumps(&tracks, &config());
        assert!(outcome.deactivate.is_empty());
        assert!(outcome.cleaned.is_empty());
    }
}
