//! PTZ speed calibration: measured units-per-second at the standard speed.
//!
//! The visual-calibration centering loop converts a desired angular
//! correction into a move duration; that conversion needs the camera's
//! actual slew rate, which varies by model and axis.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::driver::PtzDriver;
use crate::error::PtzResult;

/// The standard velocity used for calibrated moves.
pub const STANDARD_SPEED: f64 = 0.5;

/// Measured slew rates at [`STANDARD_SPEED`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedCalibration {
    /// Pan units (of the [-1, 1] axis) per second
    pub pan_units_per_sec: f64,
    /// Tilt units per second
    pub tilt_units_per_sec: f64,
}

impl SpeedCalibration {
    /// Move duration to cover `delta` units on the pan axis, bounded to a
    /// sane range.
    pub fn pan_duration(&self, delta: f64) -> Duration {
        duration_for(delta, self.pan_units_per_sec)
    }

    /// Move duration to cover `delta` units on the tilt axis.
    pub fn tilt_duration(&self, delta: f64) -> Duration {
        duration_for(delta, self.tilt_units_per_sec)
    }
}

fn duration_for(delta: f64, rate: f64) -> Duration {
    if rate <= 0.0 {
        return Duration::from_millis(100);
    }
    let secs = (delta.abs() / rate).clamp(0.05, 3.0);
    Duration::from_secs_f64(secs)
}

/// Measure pan and tilt slew rates by driving each axis at
/// [`STANDARD_SPEED`] for `probe_secs` and reading positions before and
/// after. The camera is returned to its starting position.
pub async fn calibrate_speed(
    driver: &Arc<dyn PtzDriver>,
    camera_id: &str,
    probe_secs: f64,
) -> PtzResult<SpeedCalibration> {
    let home = driver.get_status(camera_id).await?;

    // Pan axis
    driver.move_velocity(camera_id, STANDARD_SPEED, 0.0).await?;
    tokio::time::sleep(Duration::from_secs_f64(probe_secs)).await;
    driver.stop(camera_id).await?;
    let after_pan = driver.get_status(camera_id).await?;
    let pan_rate = (after_pan.pan - home.pan).abs() / probe_secs;

    // Tilt axis
    driver.move_velocity(camera_id, 0.0, STANDARD_SPEED).await?;
    tokio::time::sleep(Duration::from_secs_f64(probe_secs)).await;
    driver.stop(camera_id).await?;
    let after_tilt = driver.get_status(camera_id).await?;
    let tilt_rate = (after_tilt.tilt - after_pan.tilt).abs() / probe_secs;

    // Back to where we started
    driver
        .absolute_move(camera_id, home.pan, home.tilt, None)
        .await?;

    let calibration = SpeedCalibration {
        pan_units_per_sec: pan_rate,
        tilt_units_per_sec: tilt_rate,
    };
    info!(
        camera_id,
        pan_rate, tilt_rate, "PTZ speed calibration complete"
    );
    Ok(calibration)
}
