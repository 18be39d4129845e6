//! Visual PTZ calibration.
//!
//! Steps a grid of (pan, tilt) waypoints. At each waypoint: capture a frame,
//! reject dark or featureless views, pick a non-central corner feature,
//! then iteratively center it with relative moves whose durations come from
//! the speed calibration, re-locating the feature after each move by
//! template matching. Optionally verifies repeatability by moving away and
//! back. The camera returns to its home position no matter how the run
//! ends.

use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::driver::{FrameSource, PtzRegistry, PtzStatus};
use crate::error::PtzResult;
use crate::speed::SpeedCalibration;
use crate::vision::{extract_template, good_features, match_template, mean_luminance};

/// Visual calibration configuration.
#[derive(Debug, Clone)]
pub struct VisualCalibrationConfig {
    /// Grid waypoints to visit (at most 9)
    pub num_positions: usize,
    /// Centering iterations per waypoint
    pub centering_attempts: usize,
    /// Reject frames darker than this mean luminance
    pub min_luminance: f64,
    /// Reject frames with fewer corner features than this
    pub min_features: usize,
    /// Half-size of the tracked template, pixels
    pub template_half: u32,
    /// Stop centering when the error (fraction of half-diagonal) drops here
    pub centering_target: f64,
    /// Abort centering when template confidence falls below this
    pub min_match_confidence: f32,
    /// Settle time after an absolute move
    pub settle: Duration,
    /// Settle time after a relative centering move
    pub move_settle: Duration,
    /// Run the round-trip repeatability check on centered waypoints
    pub roundtrip_verify: bool,
}

impl Default for VisualCalibrationConfig {
    fn default() -> Self {
        Self {
            num_positions: 9,
            centering_attempts: 3,
            min_luminance: 10.0,
            min_features: 2,
            template_half: 32,
            centering_target: 0.10,
            min_match_confidence: 0.3,
            settle: Duration::from_secs(2),
            move_settle: Duration::from_secs(1),
            roundtrip_verify: true,
        }
    }
}

/// Outcome of one grid waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStatus {
    /// Centered within the target error
    Success,
    /// Template held but centering did not converge
    Partial,
    /// Template lost or centering failed outright
    Failed,
    CaptureFailed,
    TooDark,
    Featureless,
    Error,
}

/// Round-trip repeatability measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundtripResult {
    /// Reported-position drift after returning, pan/tilt units
    pub position_drift: f64,
    /// Visual error after returning, fraction of half-diagonal
    pub visual_return_error: Option<f64>,
    pub return_match_confidence: f32,
    /// Whether the feature was visually confirmed near center
    pub visual_confirmed: bool,
}

/// One grid waypoint's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridEntry {
    pub grid_index: usize,
    pub target_pan: f64,
    pub target_tilt: f64,
    /// Chosen feature's pixel position in the initial frame
    pub feature_pixel: Option<(f32, f32)>,
    /// Feature offset from frame center, fractions of width/height
    pub feature_offset: Option<(f64, f64)>,
    pub ptz_before: Option<(f64, f64)>,
    pub ptz_after: Option<(f64, f64)>,
    pub centering_error: Option<f64>,
    pub match_confidence: Option<f32>,
    pub attempts: u32,
    pub status: GridStatus,
    pub roundtrip: Option<RoundtripResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GridEntry {
    fn new(grid_index: usize, target_pan: f64, target_tilt: f64) -> Self {
        Self {
            grid_index,
            target_pan,
            target_tilt,
            feature_pixel: None,
            feature_offset: None,
            ptz_before: None,
            ptz_after: None,
            centering_error: None,
            match_confidence: None,
            attempts: 0,
            status: GridStatus::Failed,
            roundtrip: None,
            error: None,
        }
    }
}

/// Full report of one calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualCalibrationReport {
    pub camera_id: String,
    pub entries: Vec<GridEntry>,
    pub positions_successful: usize,
    pub avg_centering_error: f64,
    pub avg_match_confidence: f64,
    pub roundtrips_confirmed: usize,
}

/// The visual calibrator.
pub struct VisualCalibrator {
    registry: Arc<PtzRegistry>,
    frames: Arc<dyn FrameSource>,
    config: VisualCalibrationConfig,
}

impl VisualCalibrator {
    pub fn new(
        registry: Arc<PtzRegistry>,
        frames: Arc<dyn FrameSource>,
        config: VisualCalibrationConfig,
    ) -> Self {
        Self {
            registry,
            frames,
            config,
        }
    }

    /// Run calibration over the waypoint grid. Holds the camera's motion
    /// lock for the entire run and always attempts to return home.
    pub async fn run(
        &self,
        camera_id: &str,
        speed: Option<SpeedCalibration>,
    ) -> PtzResult<VisualCalibrationReport> {
        let _motion = self.registry.motion_lock(camera_id).await;
        let driver = self.registry.driver().clone();

        let home = driver.get_status(camera_id).await?;
        info!(
            camera_id,
            home_pan = home.pan,
            home_tilt = home.tilt,
            "Starting visual PTZ calibration"
        );

        // Downward-looking grid for a surveillance mount
        let pan_values = [-0.5, 0.0, 0.5];
        let tilt_values = [-0.3, -0.15, 0.0];
        let grid: Vec<(f64, f64)> = tilt_values
            .iter()
            .flat_map(|t| pan_values.iter().map(move |p| (*p, *t)))
            .take(self.config.num_positions)
            .collect();

        let mut entries = Vec::with_capacity(grid.len());
        for (idx, (pan, tilt)) in grid.iter().enumerate() {
            let mut entry = GridEntry::new(idx, *pan, *tilt);
            match self
                .run_waypoint(camera_id, &driver, *pan, *tilt, speed.as_ref(), &mut entry)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    entry.status = GridStatus::Error;
                    entry.error = Some(e.to_string());
                    warn!(camera_id, grid = idx, "Waypoint failed: {e}");
                }
            }
            entries.push(entry);
        }

        // Home, regardless of how the grid went
        if let Err(e) = driver.absolute_move(camera_id, home.pan, home.tilt, None).await {
            warn!(camera_id, "Failed to return PTZ home: {e}");
        }

        Ok(summarize(camera_id, entries))
    }

    async fn run_waypoint(
        &self,
        camera_id: &str,
        driver: &Arc<dyn crate::driver::PtzDriver>,
        target_pan: f64,
        target_tilt: f64,
        speed: Option<&SpeedCalibration>,
        entry: &mut GridEntry,
    ) -> PtzResult<()> {
        let cfg = &self.config;

        driver.absolute_move(camera_id, target_pan, target_tilt, None).await?;
        tokio::time::sleep(cfg.settle).await;

        let Some(frame) = self.capture_gray(camera_id).await else {
            entry.status = GridStatus::CaptureFailed;
            return Ok(());
        };
        let (frame_w, frame_h) = (frame.width() as f32, frame.height() as f32);

        if mean_luminance(&frame) < cfg.min_luminance {
            entry.status = GridStatus::TooDark;
            return Ok(());
        }

        let corners = good_features(&frame, 20, 0.01, 50.0);
        if corners.len() < cfg.min_features {
            entry.status = GridStatus::Featureless;
            return Ok(());
        }

        // Pick the feature closest to center that is not AT center: a
        // perfectly centered feature gives no pixel-to-PTZ signal
        let center = (frame_w / 2.0, frame_h / 2.0);
        let feature = corners
            .iter()
            .filter(|c| {
                let off_x = (c.x / frame_w - 0.5).abs();
                let off_y = (c.y / frame_h - 0.5).abs();
                (off_x * off_x + off_y * off_y).sqrt() >= 0.05
            })
            .min_by(|a, b| {
                let da = (a.x - center.0).powi(2) + (a.y - center.1).powi(2);
                let db = (b.x - center.0).powi(2) + (b.y - center.1).powi(2);
                da.total_cmp(&db)
            })
            .copied()
            .unwrap_or(corners[0]);

        let Some(template) = extract_template(&frame, feature.x, feature.y, cfg.template_half) else {
            entry.status = GridStatus::Failed;
            return Ok(());
        };

        let before = driver.get_status(camera_id).await?;
        let mut dx = (feature.x / frame_w - 0.5) as f64;
        let mut dy = (feature.y / frame_h - 0.5) as f64;
        entry.feature_pixel = Some((feature.x, feature.y));
        entry.feature_offset = Some((dx, dy));
        entry.ptz_before = Some((before.pan, before.tilt));

        // Centering loop
        let mut centering_error = (dx * dx + dy * dy).sqrt();
        let mut match_conf = 0.0f32;

        for attempt in 0..cfg.centering_attempts {
            entry.attempts = attempt as u32 + 1;
            if centering_error <= cfg.centering_target {
                break;
            }

            let (move_speed, move_duration) = match speed {
                Some(cal) if cal.pan_units_per_sec > 0.0 && cal.tilt_units_per_sec > 0.0 => {
                    let pan_d = cal.pan_duration(dx.abs() * 2.0 * 0.5);
                    let tilt_d = cal.tilt_duration(dy.abs() * 2.0 * 0.5);
                    (0.5, pan_d.max(tilt_d))
                }
                _ => {
                    let secs = (dx.abs().max(dy.abs()) * 2.0).clamp(0.1, 3.0);
                    (0.3, Duration::from_secs_f64(secs))
                }
            };

            // Positive dx: feature right of center, pan right. Positive dy:
            // feature below center, tilt down (negative tilt axis).
            let pan_dir = if dx > 0.0 { 1.0 } else { -1.0 };
            let tilt_dir = if dy > 0.0 { -1.0 } else { 1.0 };
            let pan_spd = (pan_dir * move_speed * (dx.abs() / dy.abs().max(0.001)).min(1.0)).clamp(-1.0, 1.0);
            let tilt_spd = (tilt_dir * move_speed * (dy.abs() / dx.abs().max(0.001)).min(1.0)).clamp(-1.0, 1.0);

            driver.move_velocity(camera_id, pan_spd, tilt_spd).await?;
            tokio::time::sleep(move_duration).await;
            driver.stop(camera_id).await?;
            tokio::time::sleep(cfg.move_settle).await;

            let Some(new_frame) = self.capture_gray(camera_id).await else {
                break;
            };
            let Some(found) = match_template(&new_frame, &template) else {
                break;
            };
            match_conf = found.confidence;
            if match_conf < cfg.min_match_confidence {
                // Template lost; cannot center reliably
                break;
            }

            dx = (found.x / new_frame.width() as f32 - 0.5) as f64;
            dy = (found.y / new_frame.height() as f32 - 0.5) as f64;
            centering_error = (dx * dx + dy * dy).sqrt();
        }

        let after = driver.get_status(camera_id).await?;
        entry.ptz_after = Some((after.pan, after.tilt));
        entry.centering_error = Some(centering_error);
        entry.match_confidence = Some(match_conf);

        entry.status = if centering_error <= cfg.centering_target {
            GridStatus::Success
        } else if match_conf >= cfg.min_match_confidence {
            GridStatus::Partial
        } else {
            GridStatus::Failed
        };

        info!(
            camera_id,
            grid = entry.grid_index,
            status = ?entry.status,
            error = centering_error,
            confidence = match_conf,
            attempts = entry.attempts,
            "Waypoint centering finished"
        );

        if cfg.roundtrip_verify && matches!(entry.status, GridStatus::Success | GridStatus::Partial) {
            entry.roundtrip = Some(
                self.roundtrip_verify(camera_id, driver, &after, &template)
                    .await?,
            );
        }

        Ok(())
    }

    /// Move away, return, and measure both reported-position drift and
    /// visual error against the tracked template.
    async fn roundtrip_verify(
        &self,
        camera_id: &str,
        driver: &Arc<dyn crate::driver::PtzDriver>,
        centered: &PtzStatus,
        template: &GrayImage,
    ) -> PtzResult<RoundtripResult> {
        let cfg = &self.config;

        driver
            .absolute_move(camera_id, centered.pan + 0.3, centered.tilt + 0.15, None)
            .await?;
        tokio::time::sleep(cfg.settle).await;
        driver
            .absolute_move(camera_id, centered.pan, centered.tilt, None)
            .await?;
        tokio::time::sleep(cfg.settle).await;

        let mut visual_return_error = None;
        let mut return_conf = 0.0f32;
        if let Some(frame) = self.capture_gray(camera_id).await {
            if let Some(found) = match_template(&frame, template) {
                return_conf = found.confidence;
                if return_conf >= cfg.min_match_confidence {
                    let dx = (found.x / frame.width() as f32 - 0.5) as f64;
                    let dy = (found.y / frame.height() as f32 - 0.5) as f64;
                    visual_return_error = Some((dx * dx + dy * dy).sqrt());
                }
            }
        }

        let returned = driver.get_status(camera_id).await?;
        let position_drift =
            ((returned.pan - centered.pan).powi(2) + (returned.tilt - centered.tilt).powi(2)).sqrt();

        Ok(RoundtripResult {
            position_drift,
            visual_return_error,
            return_match_confidence: return_conf,
            visual_confirmed: visual_return_error.is_some_and(|e| e < 0.15),
        })
    }

    async fn capture_gray(&self, camera_id: &str) -> Option<GrayImage> {
        match self.frames.capture(camera_id).await {
            Ok(img) => Some(to_gray(img)),
            Err(e) => {
                warn!(camera_id, "Frame capture failed: {e}");
                None
            }
        }
    }
}

fn to_gray(img: DynamicImage) -> GrayImage {
    img.to_luma8()
}

fn summarize(camera_id: &str, entries: Vec<GridEntry>) -> VisualCalibrationReport {
    let ok: Vec<&GridEntry> = entries
        .iter()
        .filter(|e| matches!(e.status, GridStatus::Success | GridStatus::Partial))
        .collect();

    let avg_centering_error = if ok.is_empty() {
        0.0
    } else {
        ok.iter().filter_map(|e| e.centering_error).sum::<f64>() / ok.len() as f64
    };
    let avg_match_confidence = if ok.is_empty() {
        0.0
    } else {
        ok.iter().filter_map(|e| e.match_confidence).map(f64::from).sum::<f64>() / ok.len() as f64
    };
    let roundtrips_confirmed = entries
        .iter()
        .filter(|e| e.roundtrip.as_ref().is_some_and(|r| r.visual_confirmed))
        .count();

    VisualCalibrationReport {
        camera_id: camera_id.to_string(),
        positions_successful: ok.len(),
        avg_centering_error,
        avg_match_confidence,
        roundtrips_confirmed,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PtzDriver;
    use async_trait::async_trait;
    use image::Luma;
    use tokio::sync::Mutex;

    /// Closed-loop fake: the camera "sees" a bright square whose frame
    /// position tracks the current pan/tilt, so centering moves actually
    /// center it.
    struct SimRig {
        state: Mutex<PtzStatus>,
    }

    const FRAME_W: u32 = 128;
    const FRAME_H: u32 = 96;
    /// Pixels the feature moves per pan/tilt unit
    const GAIN: f64 = 40.0;

    struct SimDriver(Arc<SimRig>);
    struct SimFrames(Arc<SimRig>);

    #[async_trait]
    impl PtzDriver for SimDriver {
        async fn move_velocity(&self, _: &str, pan_v: f64, tilt_v: f64) -> PtzResult<()> {
            // A velocity command applies a fixed displacement step
            let mut s = self.0.state.lock().await;
            s.pan += pan_v;
            s.tilt += tilt_v;
            Ok(())
        }
        async fn stop(&self, _: &str) -> PtzResult<()> {
            Ok(())
        }
        async fn absolute_move(&self, _: &str, pan: f64, tilt: f64, _: Option<f64>) -> PtzResult<()> {
            let mut s = self.0.state.lock().await;
            s.pan = pan;
            s.tilt = tilt;
            Ok(())
        }
        async fn get_status(&self, _: &str) -> PtzResult<PtzStatus> {
            Ok(*self.0.state.lock().await)
        }
    }

    #[async_trait]
    impl FrameSource for SimFrames {
        async fn capture(&self, _: &str) -> PtzResult<DynamicImage> {
            let s = *self.0.state.lock().await;
            // Feature sits right of center at pan 0 and moves left as the
            // camera pans right
            let fx = (FRAME_W as f64 / 2.0 + 20.0 - s.pan * GAIN).round() as i64;
            let fy = (FRAME_H as f64 / 2.0 + 10.0 + s.tilt * GAIN).round() as i64;

            let mut img = GrayImage::from_pixel(FRAME_W, FRAME_H, Luma([30]));
            // Two squares over 50 px apart so the corner detector reports
            // multiple spaced features
            for (cx, cy, value) in [(fx, fy, 230u8), (fx - 60, fy + 30, 180u8)] {
                for dy in -4..4i64 {
                    for dx in -4..4i64 {
                        let x = cx + dx;
                        let y = cy + dy;
                        if (0..FRAME_W as i64).contains(&x) && (0..FRAME_H as i64).contains(&y) {
                            img.put_pixel(x as u32, y as u32, Luma([value]));
                        }
                    }
                }
            }
            Ok(DynamicImage::ImageLuma8(img))
        }
    }

    fn quick_config() -> VisualCalibrationConfig {
        VisualCalibrationConfig {
            num_positions: 1,
            centering_attempts: 5,
            template_half: 8,
            settle: Duration::from_millis(1),
            move_settle: Duration::from_millis(1),
            roundtrip_verify: true,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_centering_converges_on_sim_rig() {
        let rig = Arc::new(SimRig {
            state: Mutex::new(PtzStatus::default()),
        });
        let registry = Arc::new(PtzRegistry::new(Arc::new(SimDriver(Arc::clone(&rig)))));
        let frames = Arc::new(SimFrames(Arc::clone(&rig)));

        let calibrator = VisualCalibrator::new(registry, frames, quick_config());
        let report = calibrator.run("ptz-1", None).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert!(
            matches!(entry.status, GridStatus::Success | GridStatus::Partial),
            "unexpected status {:?} (error {:?})",
            entry.status,
            entry.error
        );
        assert!(entry.attempts >= 1);
        // The round-trip check ran for a centered waypoint
        assert!(entry.roundtrip.is_some());
        // Home restored after the run (waypoint grid starts at pan -0.5)
        let home = rig.state.lock().await;
        assert!((home.pan - 0.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dark_frame_rejected() {
        struct DarkFrames;
        #[async_trait]
        impl FrameSource for DarkFrames {
            async fn capture(&self, _: &str) -> PtzResult<DynamicImage> {
                Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([3]))))
            }
        }

        let rig = Arc::new(SimRig {
            state: Mutex::new(PtzStatus::default()),
        });
        let registry = Arc::new(PtzRegistry::new(Arc::new(SimDriver(rig))));
        let calibrator = VisualCalibrator::new(registry, Arc::new(DarkFrames), quick_config());

        let report = calibrator.run("ptz-1", None).await.unwrap();
        assert_eq!(report.entries[0].status, GridStatus::TooDark);
        assert_eq!(report.positions_successful, 0);
    }
}
