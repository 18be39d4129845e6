//! Travel-direction estimation from trajectories and upstream path data.

use serde::{Deserialize, Serialize};

use crate::geometry::TrajectoryPoint;
use crate::video::PathSample;
use crate::video_track::TravelDirection;

/// Minimum displacement for a usable direction: 5% of the frame diagonal.
/// Parked vehicles have jitter (tens of pixels over hours) that must not be
/// treated as direction of travel.
pub const MIN_DISPLACEMENT_FRAC: f64 = 0.05;

/// Minimum path duration for a usable direction.
pub const MIN_PATH_DURATION_SEC: f64 = 0.5;

/// Estimated motion of a track in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackMotion {
    /// Average x velocity, px/s (positive = moving right)
    pub dx: f64,
    /// Average y velocity, px/s (positive = moving down)
    pub dy: f64,
    /// Direction angle in degrees (0 = right, 90 = down, 180 = left)
    pub angle_deg: f64,
    /// Average speed in px/s
    pub speed_px_s: f64,
    /// Simplified label
    pub direction: TravelDirection,
}

impl TrackMotion {
    /// Unit direction vector, or `None` for (near-)zero velocity.
    pub fn unit(&self) -> Option<(f64, f64)> {
        let mag = (self.dx * self.dx + self.dy * self.dy).sqrt();
        if mag < 1e-9 {
            return None;
        }
        Some((self.dx / mag, self.dy / mag))
    }
}

/// Compute travel direction from trajectory points.
///
/// Averages the centroids of the first and last 25% of points before taking
/// the displacement, which is more robust to per-frame bbox jitter than
/// first-to-last-point. Returns `None` for trajectories with fewer than 4
/// points.
pub fn compute_travel_direction(trajectory: &[TrajectoryPoint]) -> Option<TrackMotion> {
    if trajectory.len() < 4 {
        return None;
    }

    let n = trajectory.len();
    let q = (n / 4).max(1);
    let first_quarter = &trajectory[..q];
    let last_quarter = &trajectory[n - q..];

    fn avg_centroid(pts: &[TrajectoryPoint]) -> (f64, f64) {
        let n = pts.len() as f64;
        let cx = pts.iter().map(|p| p.x + p.w / 2.0).sum::<f64>() / n;
        let cy = pts.iter().map(|p| p.y + p.h / 2.0).sum::<f64>() / n;
        (cx, cy)
    }

    let (cx_start, cy_start) = avg_centroid(first_quarter);
    let (cx_end, cy_end) = avg_centroid(last_quarter);

    let dx = cx_end - cx_start;
    let dy = cy_end - cy_start;

    // Time span between the quarter-average timestamps; fall back to the
    // endpoint timestamps when degenerate
    let t_start = first_quarter.iter().map(|p| p.timestamp).sum::<f64>() / first_quarter.len() as f64;
    let t_end = last_quarter.iter().map(|p| p.timestamp).sum::<f64>() / last_quarter.len() as f64;
    let mut dt = t_end - t_start;
    if dt <= 0.0 {
        dt = trajectory[n - 1].timestamp - trajectory[0].timestamp;
        if dt <= 0.0 {
            dt = 1.0;
        }
    }

    let speed_px_s = (dx * dx + dy * dy).sqrt() / dt;
    let angle_deg = dy.atan2(dx).to_degrees().rem_euclid(360.0);

    let abs_dx = dx.abs();
    let abs_dy = dy.abs();
    let direction = if speed_px_s < 5.0 {
        TravelDirection::Stationary
    } else if abs_dx > abs_dy * 1.5 {
        if dx > 0.0 {
            TravelDirection::LeftToRight
        } else {
            TravelDirection::RightToLeft
        }
    } else if abs_dy > abs_dx * 1.5 {
        if dy > 0.0 {
            TravelDirection::Approaching
        } else {
            TravelDirection::Departing
        }
    } else if abs_dx >= abs_dy {
        // Diagonal: dominant axis wins
        if dx > 0.0 {
            TravelDirection::LeftToRight
        } else {
            TravelDirection::RightToLeft
        }
    } else if dy > 0.0 {
        TravelDirection::Approaching
    } else {
        TravelDirection::Departing
    };

    Some(TrackMotion {
        dx: dx / dt,
        dy: dy / dt,
        angle_deg,
        speed_px_s,
        direction,
    })
}

/// Normalized travel direction from upstream path data, converted to pixel
/// space with the video dimensions.
///
/// Rejected as unreliable when the path lasts under
/// [`MIN_PATH_DURATION_SEC`] or the displacement is below
/// [`MIN_DISPLACEMENT_FRAC`] of the frame diagonal.
pub fn direction_from_path(path: &[PathSample], frame_w: f64, frame_h: f64) -> Option<(f64, f64)> {
    if path.len() < 2 {
        return None;
    }
    let first = path.first()?;
    let last = path.last()?;

    let duration = last.timestamp - first.timestamp;
    if duration < MIN_PATH_DURATION_SEC {
        return None;
    }

    let dx = (last.cx - first.cx) * frame_w;
    let dy = (last.cy - first.cy) * frame_h;
    let length = (dx * dx + dy * dy).sqrt();

    let min_displacement = MIN_DISPLACEMENT_FRAC * (frame_w * frame_w + frame_h * frame_h).sqrt();
    if length < min_displacement {
        return None;
    }

    Some((dx / length, dy / length))
}

/// Compatibility of two travel directions for a cross-camera match, 0 to 1.
///
/// Same general direction scores 1.0; opposite directions score 0.15 (to be
/// vetoed downstream); perpendicular is ambiguous at 0.6. Missing and
/// stationary cases get graduated penalties.
pub fn direction_compatibility(a: Option<&TrackMotion>, b: Option<&TrackMotion>) -> f64 {
    let (a, b) = match (a, b) {
        (None, None) => return 0.4,
        (Some(_), None) | (None, Some(_)) => return 0.5,
        (Some(a), Some(b)) => (a, b),
    };

    if a.direction == TravelDirection::Stationary && b.direction == TravelDirection::Stationary {
        return 0.9;
    }
    if a.direction == TravelDirection::Stationary || b.direction == TravelDirection::Stationary {
        return 0.6;
    }

    let mag_a = (a.dx * a.dx + a.dy * a.dy).sqrt();
    let mag_b = (b.dx * b.dx + b.dy * b.dy).sqrt();
    if mag_a < 1e-9 || mag_b < 1e-9 {
        return 0.8;
    }

    let cos_sim = (a.dx * b.dx + a.dy * b.dy) / (mag_a * mag_b);
    if cos_sim > 0.3 {
        1.0
    } else if cos_sim < -0.3 {
        // Cameras facing each other show opposite pixel-space directions for
        // one vehicle; such pairs are marked bidirectional in topology and
        // never reach this path
        0.15
    } else {
        0.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(points: &[(f64, f64, f64)]) -> Vec<TrajectoryPoint> {
        points
            .iter()
            .map(|(ts, x, y)| TrajectoryPoint {
                timestamp: *ts,
                x: *x,
                y: *y,
                w: 40.0,
                h: 20.0,
                conf: 0.8,
            })
            .collect()
    }

    #[test]
    fn test_left_to_right() {
        let t = traj(&[(0.0, 0.0, 100.0), (0.5, 100.0, 100.0), (1.0, 200.0, 100.0), (1.5, 300.0, 100.0)]);
        let motion = compute_travel_direction(&t).unwrap();
        assert_eq!(motion.direction, TravelDirection::LeftToRight);
        assert!(motion.dx > 0.0);
    }

    #[test]
    fn test_stationary() {
        let t = traj(&[(0.0, 100.0, 100.0), (1.0, 101.0, 100.0), (2.0, 100.0, 101.0), (3.0, 100.5, 100.0)]);
        let motion = compute_travel_direction(&t).unwrap();
        assert_eq!(motion.direction, TravelDirection::Stationary);
    }

    #[test]
    fn test_too_few_points() {
        let t = traj(&[(0.0, 0.0, 0.0), (1.0, 50.0, 0.0)]);
        assert!(compute_travel_direction(&t).is_none());
    }

    #[test]
    fn test_opposite_directions_score_low() {
        let right = compute_travel_direction(&traj(&[
            (0.0, 0.0, 100.0), (0.5, 100.0, 100.0), (1.0, 200.0, 100.0), (1.5, 300.0, 100.0),
        ]))
        .unwrap();
        let left = compute_travel_direction(&traj(&[
            (0.0, 300.0, 100.0), (0.5, 200.0, 100.0), (1.0, 100.0, 100.0), (1.5, 0.0, 100.0),
        ]))
        .unwrap();

        let same = direction_compatibility(Some(&right), Some(&right));
        let opposite = direction_compatibility(Some(&right), Some(&left));
        assert_eq!(same, 1.0);
        assert!(opposite < 0.3);
    }

    #[test]
    fn test_unknown_direction_penalties() {
        assert_eq!(direction_compatibility(None, None), 0.4);
        let right = compute_travel_direction(&traj(&[
            (0.0, 0.0, 100.0), (0.5, 100.0, 100.0), (1.0, 200.0, 100.0), (1.5, 300.0, 100.0),
        ]))
        .unwrap();
        assert_eq!(direction_compatibility(Some(&right), None), 0.5);
    }

    #[test]
    fn test_path_direction_requires_displacement() {
        // 1% of the frame diagonal: too small
        let tiny = vec![
            PathSample { cx: 0.50, cy: 0.50, timestamp: 0.0 },
            PathSample { cx: 0.51, cy: 0.50, timestamp: 2.0 },
        ];
        assert!(direction_from_path(&tiny, 1920.0, 1080.0).is_none());

        let moving = vec![
            PathSample { cx: 0.1, cy: 0.5, timestamp: 0.0 },
            PathSample { cx: 0.9, cy: 0.5, timestamp: 2.0 },
        ];
        let (dx, dy) = direction_from_path(&moving, 1920.0, 1080.0).unwrap();
        assert!(dx > 0.99);
        assert!(dy.abs() < 0.01);
    }

    #[test]
    fn test_path_direction_requires_duration() {
        let quick = vec![
            PathSample { cx: 0.1, cy: 0.5, timestamp: 0.0 },
            PathSample { cx: 0.9, cy: 0.5, timestamp: 0.2 },
        ];
        assert!(direction_from_path(&quick, 1920.0, 1080.0).is_none());
    }
}
