//! The clip retrieval service seam.
//!
//! Analysis code depends on this trait; production wires it to the NVR's
//! clip API, tests and offline runs use [`LocalClipService`] over a clips
//! directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, scan_decode_errors};

/// Result of fetching a clip by event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedClip {
    pub path: PathBuf,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe summary used by analysis scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipProbe {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub decode_errors: Vec<String>,
}

/// Clip retrieval operations the core depends on.
#[async_trait]
pub trait ClipService: Send + Sync {
    /// Fetch the clip for an upstream event id onto local disk.
    async fn fetch_clip(&self, event_id: &str, camera_id: &str) -> MediaResult<FetchedClip>;

    /// Locate an already-fetched clip by filename, when supported.
    async fn locate(&self, _filename: &str) -> MediaResult<Option<PathBuf>> {
        Ok(None)
    }

    /// Probe a local clip.
    async fn probe_clip(&self, path: &Path) -> MediaResult<ClipProbe>;

    /// Extract `[start_time, start_time + duration)` of `src` to a new file.
    async fn extract_clip(&self, src: &Path, start_time: f64, duration: f64) -> MediaResult<PathBuf>;
}

/// Clip service over a local clips directory (plus a downloads fallback).
///
/// Fetching resolves `{event_id}.mp4` under the configured directories; no
/// network is involved. Extraction is a stream copy.
#[derive(Debug, Clone)]
pub struct LocalClipService {
    clips_dir: PathBuf,
    downloads_dir: PathBuf,
}

impl LocalClipService {
    pub fn new(clips_dir: impl Into<PathBuf>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            clips_dir: clips_dir.into(),
            downloads_dir: downloads_dir.into(),
        }
    }

    /// Search clips/ then downloads/ for a filename.
    pub fn resolve_filename(&self, filename: &str) -> Option<PathBuf> {
        for dir in [&self.clips_dir, &self.downloads_dir] {
            let candidate = dir.join(filename);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl ClipService for LocalClipService {
    async fn fetch_clip(&self, event_id: &str, _camera_id: &str) -> MediaResult<FetchedClip> {
        let filename = format!("{event_id}.mp4");
        match self.resolve_filename(&filename) {
            Some(path) => Ok(FetchedClip {
                path,
                success: true,
                error: None,
            }),
            None => Ok(FetchedClip {
                path: self.clips_dir.join(&filename),
                success: false,
                error: Some(format!("no clip on disk for event {event_id}")),
            }),
        }
    }

    async fn locate(&self, filename: &str) -> MediaResult<Option<PathBuf>> {
        Ok(self.resolve_filename(filename))
    }

    async fn probe_clip(&self, path: &Path) -> MediaResult<ClipProbe> {
        let info = probe_video(path).await?;
        let report = scan_decode_errors(path, 300).await.unwrap_or_else(|_| {
            // Probe-only callers should still get dimensions when the decode
            // scan itself fails
            crate::probe::DecodeReport {
                decode_errors: 0,
                dts_warnings: 0,
                error_lines: Vec::new(),
            }
        });
        Ok(ClipProbe {
            duration_seconds: info.duration,
            width: info.width,
            height: info.height,
            fps: info.fps,
            decode_errors: report.error_lines,
        })
    }

    async fn extract_clip(&self, src: &Path, start_time: f64, duration: f64) -> MediaResult<PathBuf> {
        if !src.exists() {
            return Err(MediaError::FileNotFound(src.to_path_buf()));
        }
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "clip".to_string());
        let out = src.with_file_name(format!("{stem}_{:.1}_{:.1}.mp4", start_time, duration));

        let cmd = FfmpegCommand::new(src, &out)
            .seek(start_time.max(0.0))
            .duration(duration)
            .output_args(["-c", "copy"]);
        FfmpegRunner::new().with_timeout(120).run(&cmd).await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_missing_clip_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let svc = LocalClipService::new(dir.path(), dir.path());
        let fetched = svc.fetch_clip("nonexistent-event", "cam-a").await.unwrap();
        assert!(!fetched.success);
        assert!(fetched.error.is_some());
    }

    #[tokio::test]
    async fn test_resolve_filename_prefers_clips_dir() {
        let clips = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        std::fs::write(clips.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(downloads.path().join("a.mp4"), b"y").unwrap();

        let svc = LocalClipService::new(clips.path(), downloads.path());
        let resolved = svc.resolve_filename("a.mp4").unwrap();
        assert!(resolved.starts_with(clips.path()));
    }
}
