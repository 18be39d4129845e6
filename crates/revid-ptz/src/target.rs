//! Absolute targeting: aim a PTZ at a bbox seen by another camera.
//!
//! With three or more confirmed reference points for the (source, target)
//! pair, pan and tilt are interpolated with an RBF over the source bbox
//! position. Otherwise a geometric estimate projects the bbox center
//! through the source camera's FOV onto a ground ray and points the PTZ at
//! the resulting world position.

use revid_models::Camera;
use revid_store::Store;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PtzError, PtzResult};
use crate::geo::{bearing_between, destination_point, wrap_degrees};
use crate::rbf::RbfInterpolator;

/// How a target solution was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMethod {
    /// RBF interpolation over confirmed reference points
    Calibrated,
    /// FOV projection and bearing geometry
    Geometry,
}

/// A computed PTZ aim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSolution {
    /// ONVIF-normalized pan to command
    pub pan: f64,
    /// ONVIF-normalized tilt to command
    pub tilt: f64,
    /// The pure-geometry estimate, kept for comparison
    pub geo_pan: f64,
    pub geo_tilt: f64,
    pub method: TargetMethod,
    /// Reference points available for the pair
    pub calibration_points: usize,
}

/// Geometric estimate: project the bbox center through the source camera's
/// FOV onto the ground, then convert the bearing from the target camera into
/// its normalized pan range.
fn geometry_estimate(source: &Camera, target: &Camera, bbox_x: f64, bbox_y: f64) -> PtzResult<(f64, f64)> {
    let ptz = target
        .ptz
        .as_ref()
        .ok_or_else(|| PtzError::NotPtz(target.camera_id.clone()))?;

    // Horizontal offset across the FOV; vertical position approximates
    // distance along the view ray (bottom of frame = close)
    let horizontal_offset = (bbox_x - 0.5) * source.fov_angle_deg;
    let bearing_to_object = source.bearing_deg + horizontal_offset;
    let distance = source.fov_range_m * (1.0 - bbox_y).max(0.1);

    let (world_lat, world_lng) =
        destination_point(source.latitude, source.longitude, distance, bearing_to_object);
    let ptz_bearing = bearing_between(target.latitude, target.longitude, world_lat, world_lng);

    // Normalize: bearing relative to the PTZ home, scaled into [-1, 1]
    let relative = wrap_degrees(ptz_bearing - ptz.home_bearing_deg);
    let pan = (relative / (ptz.pan_range_deg / 2.0)).clamp(-1.0, 1.0);

    // No elevation data in camera config
    Ok((pan, 0.0))
}

/// Compute the pan/tilt to aim `target_camera_id` at a bbox on
/// `source_camera_id`. `bbox_x`/`bbox_y` are the normalized bbox center on
/// the source frame.
pub async fn compute_target(
    store: &Store,
    source_camera_id: &str,
    target_camera_id: &str,
    bbox_x: f64,
    bbox_y: f64,
) -> PtzResult<TargetSolution> {
    let source = store
        .get_camera(source_camera_id)
        .await
        .map_err(|_| PtzError::CameraNotFound(source_camera_id.to_string()))?;
    let target = store
        .get_camera(target_camera_id)
        .await
        .map_err(|_| PtzError::CameraNotFound(target_camera_id.to_string()))?;

    let (geo_pan, geo_tilt) = geometry_estimate(&source, &target, bbox_x, bbox_y)?;

    let cal_points = store
        .list_calibration_points(source_camera_id, target_camera_id)
        .await?;

    if cal_points.len() >= 3 {
        let coords: Vec<(f64, f64)> = cal_points
            .iter()
            .map(|p| (p.source_bbox_x, p.source_bbox_y))
            .collect();
        let pans: Vec<f64> = cal_points.iter().map(|p| p.actual_pan).collect();
        let tilts: Vec<f64> = cal_points.iter().map(|p| p.actual_tilt).collect();

        match (RbfInterpolator::fit(&coords, &pans), RbfInterpolator::fit(&coords, &tilts)) {
            (Ok(pan_interp), Ok(tilt_interp)) => {
                let solution = TargetSolution {
                    pan: pan_interp.eval(bbox_x, bbox_y).clamp(-1.0, 1.0),
                    tilt: tilt_interp.eval(bbox_x, bbox_y).clamp(-1.0, 1.0),
                    geo_pan,
                    geo_tilt,
                    method: TargetMethod::Calibrated,
                    calibration_points: cal_points.len(),
                };
                info!(
                    source = source_camera_id,
                    target = target_camera_id,
                    pan = solution.pan,
                    tilt = solution.tilt,
                    points = cal_points.len(),
                    "Calibrated PTZ target"
                );
                return Ok(solution);
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("RBF interpolation failed, falling back to geometry: {e}");
            }
        }
    }

    Ok(TargetSolution {
        pan: geo_pan,
        tilt: geo_tilt,
        geo_pan,
        geo_tilt,
        method: TargetMethod::Geometry,
        calibration_points: cal_points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use revid_models::{PtzCalibrationPoint, PtzSettings};

    fn camera(id: &str, lat: f64, lng: f64, bearing: f64, ptz: bool) -> Camera {
        Camera {
            camera_id: id.to_string(),
            latitude: lat,
            longitude: lng,
            bearing_deg: bearing,
            fov_angle_deg: 90.0,
            fov_range_m: 50.0,
            ptz: ptz.then_some(PtzSettings {
                pan_range_deg: 180.0,
                home_bearing_deg: bearing,
            }),
            onvif_endpoint: None,
        }
    }

    async fn seeded_store() -> Store {
        let store = Store::new();
        store
            .upsert_camera(camera("fixed", 45.0, -120.0, 0.0, false))
            .await
            .unwrap();
        store
            .upsert_camera(camera("ptz", 45.0005, -120.0, 180.0, true))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_geometry_fallback_with_no_points() {
        let store = seeded_store().await;
        let solution = compute_target(&store, "fixed", "ptz", 0.5, 0.5).await.unwrap();
        assert_eq!(solution.method, TargetMethod::Geometry);
        assert_eq!(solution.calibration_points, 0);
        assert!(solution.pan.abs() <= 1.0);
    }

    #[tokio::test]
    async fn test_calibrated_interpolation_with_points() {
        let store = seeded_store().await;
        for (x, y, pan, tilt) in [
            (0.2, 0.3, -0.4, -0.1),
            (0.8, 0.3, 0.4, -0.1),
            (0.5, 0.8, 0.0, -0.3),
            (0.3, 0.6, -0.2, -0.2),
        ] {
            store
                .insert_calibration_point(PtzCalibrationPoint {
                    id: 0,
                    source_camera_id: "fixed".into(),
                    target_camera_id: "ptz".into(),
                    source_bbox_x: x,
                    source_bbox_y: y,
                    estimated_pan: 0.0,
                    estimated_tilt: 0.0,
                    actual_pan: pan,
                    actual_tilt: tilt,
                    label: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let solution = compute_target(&store, "fixed", "ptz", 0.2, 0.3).await.unwrap();
        assert_eq!(solution.method, TargetMethod::Calibrated);
        assert_eq!(solution.calibration_points, 4);
        // Interpolation passes through the reference point
        assert!((solution.pan - -0.4).abs() < 1e-4);
        assert!((solution.tilt - -0.1).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_targeting_non_ptz_rejected() {
        let store = seeded_store().await;
        let err = compute_target(&store, "ptz", "fixed", 0.5, 0.5).await;
        assert!(matches!(err, Err(PtzError::NotPtz(_))));
    }
}
