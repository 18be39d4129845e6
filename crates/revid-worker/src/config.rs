//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Where clip files are stored
    pub clips_dir: PathBuf,
    /// Fallback directory for downloaded clips
    pub downloads_dir: PathBuf,
    /// Where crops (best frames, training exports) are written
    pub crops_dir: PathBuf,
    /// Default entity type for matching jobs
    pub entity_type: String,
    /// Default scenario namespace
    pub scenario: String,
    /// TTL for the per-worker topology cache
    pub topology_cache_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(30),
            clips_dir: PathBuf::from("/var/lib/revid/clips"),
            downloads_dir: PathBuf::from("/var/lib/revid/downloads"),
            crops_dir: PathBuf::from("/var/lib/revid/crops"),
            entity_type: "vehicle".to_string(),
            scenario: "vehicle_detection".to_string(),
            topology_cache_ttl: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            clips_dir: std::env::var("CLIPS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.clips_dir),
            downloads_dir: std::env::var("DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            crops_dir: std::env::var("CROPS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.crops_dir),
            entity_type: std::env::var("ENTITY_TYPE").unwrap_or(defaults.entity_type),
            scenario: std::env::var("SCENARIO").unwrap_or(defaults.scenario),
            topology_cache_ttl: Duration::from_secs(
                std::env::var("TOPOLOGY_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}
