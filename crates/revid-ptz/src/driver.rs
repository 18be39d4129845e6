//! PTZ driver and frame capture seams.
//!
//! The ONVIF protocol itself is out of scope; production wires these traits
//! to an ONVIF client, tests use scripted fakes. All pan/tilt/zoom values
//! are ONVIF-normalized to [-1, 1].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::DynamicImage;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::PtzResult;

/// Current PTZ position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PtzStatus {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

/// Motion control for PTZ cameras.
#[async_trait]
pub trait PtzDriver: Send + Sync {
    /// Start a continuous move at the given axis velocities in [-1, 1].
    async fn move_velocity(&self, camera_id: &str, pan_velocity: f64, tilt_velocity: f64) -> PtzResult<()>;

    /// Stop all motion.
    async fn stop(&self, camera_id: &str) -> PtzResult<()>;

    /// Move to an absolute position.
    async fn absolute_move(&self, camera_id: &str, pan: f64, tilt: f64, zoom: Option<f64>) -> PtzResult<()>;

    /// Read the current position.
    async fn get_status(&self, camera_id: &str) -> PtzResult<PtzStatus>;
}

/// Still-frame capture from a camera stream.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Capture one frame from the camera.
    async fn capture(&self, camera_id: &str) -> PtzResult<DynamicImage>;
}

struct CameraSlot {
    motion_lock: Arc<Mutex<()>>,
    last_used: Instant,
}

/// Per-camera coordination over a shared driver.
///
/// Serializes motion commands per PTZ (two concurrent centering loops on one
/// camera would fight each other) and expires idle per-camera state after a
/// TTL, mirroring the 5-minute connection cache on the ONVIF side.
pub struct PtzRegistry {
    driver: Arc<dyn PtzDriver>,
    ttl: Duration,
    slots: Mutex<HashMap<String, CameraSlot>>,
}

impl PtzRegistry {
    /// Create a registry with the default 5-minute TTL.
    pub fn new(driver: Arc<dyn PtzDriver>) -> Self {
        Self::with_ttl(driver, Duration::from_secs(300))
    }

    pub fn with_ttl(driver: Arc<dyn PtzDriver>, ttl: Duration) -> Self {
        Self {
            driver,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying driver.
    pub fn driver(&self) -> &Arc<dyn PtzDriver> {
        &self.driver
    }

    /// Acquire the motion lock for one camera. Hold the guard for the whole
    /// motion sequence (move, settle, verify).
    pub async fn motion_lock(&self, camera_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut slots = self.slots.lock().await;
            slots.retain(|_, slot| slot.last_used.elapsed() < self.ttl);
            let slot = slots.entry(camera_id.to_string()).or_insert_with(|| CameraSlot {
                motion_lock: Arc::new(Mutex::new(())),
                last_used: Instant::now(),
            });
            slot.last_used = Instant::now();
            Arc::clone(&slot.motion_lock)
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NullDriver;

    #[async_trait]
    impl PtzDriver for NullDriver {
        async fn move_velocity(&self, _: &str, _: f64, _: f64) -> PtzResult<()> {
            Ok(())
        }
        async fn stop(&self, _: &str) -> PtzResult<()> {
            Ok(())
        }
        async fn absolute_move(&self, _: &str, _: f64, _: f64, _: Option<f64>) -> PtzResult<()> {
            Ok(())
        }
        async fn get_status(&self, _: &str) -> PtzResult<PtzStatus> {
            Ok(PtzStatus::default())
        }
    }

    #[tokio::test]
    async fn test_motion_lock_serializes_per_camera() {
        let registry = Arc::new(PtzRegistry::new(Arc::new(NullDriver)));
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = registry.motion_lock("ptz-1").await;
                let active = counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(active, 0, "two motion sequences ran concurrently");
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_different_cameras_do_not_block() {
        let registry = PtzRegistry::new(Arc::new(NullDriver));
        let _a = registry.motion_lock("ptz-1").await;
        // A second camera's lock must be acquirable while the first is held
        let _b = registry.motion_lock("ptz-2").await;
    }
}
