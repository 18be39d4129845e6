//! Bounding-box and trajectory geometry.
//!
//! All coordinates are absolute pixels in the camera frame unless noted.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner
    pub x: f64,
    /// Y coordinate of the top-left corner
    pub y: f64,
    /// Width in pixels
    pub w: f64,
    /// Height in pixels
    pub h: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Box area.
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Center point (cx, cy).
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Diagonal length.
    pub fn diagonal(&self) -> f64 {
        (self.w * self.w + self.h * self.h).sqrt()
    }

    /// True when both dimensions are positive.
    pub fn is_valid(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    /// Intersection area with another box.
    fn intersection(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.w).min(other.x + other.w);
        let iy2 = (self.y + self.h).min(other.y + other.h);
        (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection(other);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// IoU variant using the min-area denominator.
    ///
    /// Standard IoU penalizes bbox size differences. IoMin = intersection /
    /// min(area) is more robust when bboxes fluctuate in size (waving flags,
    /// oscillating detector output on a parked vehicle).
    pub fn iou_min(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection(other);
        if inter == 0.0 {
            return 0.0;
        }
        let min_area = self.area().min(other.area());
        if min_area > 0.0 {
            inter / min_area
        } else {
            0.0
        }
    }
}

/// One sample of a track trajectory.
///
/// Trajectories are stored as contiguous arrays of these value types; the
/// hot matching paths iterate them without any pointer chasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Seconds from clip start
    pub timestamp: f64,
    /// Bounding box top-left x
    pub x: f64,
    /// Bounding box top-left y
    pub y: f64,
    /// Bounding box width
    pub w: f64,
    /// Bounding box height
    pub h: f64,
    /// Detection confidence at this sample
    pub conf: f32,
}

impl TrajectoryPoint {
    /// The bounding box of this sample.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.w, self.h)
    }

    /// Centroid of this sample's bbox.
    pub fn center(&self) -> (f64, f64) {
        self.bbox().center()
    }
}

/// Find the trajectory point nearest to `timestamp`, within `max_gap` seconds.
pub fn nearest_point(traj: &[TrajectoryPoint], timestamp: f64, max_gap: f64) -> Option<&TrajectoryPoint> {
    let mut best: Option<&TrajectoryPoint> = None;
    let mut best_dist = f64::INFINITY;
    for pt in traj {
        let dist = (pt.timestamp - timestamp).abs();
        if dist < best_dist {
            best_dist = dist;
            best = Some(pt);
        }
    }
    if best_dist <= max_gap {
        best
    } else {
        None
    }
}

/// Mean bounding box over a trajectory.
pub fn mean_bbox(traj: &[TrajectoryPoint]) -> Option<BoundingBox> {
    if traj.is_empty() {
        return None;
    }
    let n = traj.len() as f64;
    let (mut x, mut y, mut w, mut h) = (0.0, 0.0, 0.0, 0.0);
    for pt in traj {
        x += pt.x;
        y += pt.y;
        w += pt.w;
        h += pt.h;
    }
    Some(BoundingBox::new(x / n, y / n, w / n, h / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_no_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_perfect_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        // Intersection 5x5=25, union 100+100-25=175
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_min_tolerates_size_wobble() {
        let small = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let large = BoundingBox::new(0.0, 0.0, 40.0, 40.0);
        // Small box fully inside large: IoMin = 1.0, IoU much smaller
        assert!((small.iou_min(&large) - 1.0).abs() < 1e-9);
        assert!(small.iou(&large) < 0.1);
    }

    #[test]
    fn test_nearest_point_respects_max_gap() {
        let traj = vec![
            TrajectoryPoint { timestamp: 1.0, x: 0.0, y: 0.0, w: 10.0, h: 10.0, conf: 0.9 },
            TrajectoryPoint { timestamp: 2.0, x: 5.0, y: 0.0, w: 10.0, h: 10.0, conf: 0.9 },
        ];
        assert!(nearest_point(&traj, 2.1, 0.5).is_some());
        assert!(nearest_point(&traj, 4.0, 0.5).is_none());
    }

    #[test]
    fn test_mean_bbox() {
        let traj = vec![
            TrajectoryPoint { timestamp: 0.0, x: 0.0, y: 0.0, w: 10.0, h: 20.0, conf: 0.9 },
            TrajectoryPoint { timestamp: 1.0, x: 10.0, y: 10.0, w: 20.0, h: 40.0, conf: 0.9 },
        ];
        let avg = mean_bbox(&traj).unwrap();
        assert!((avg.x - 5.0).abs() < 1e-9);
        assert!((avg.w - 15.0).abs() < 1e-9);
        assert!((avg.h - 30.0).abs() < 1e-9);
    }
}
