//! Clip sanitizer: re-encode around corrupt frames and broken timestamps.

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{get_duration, scan_decode_errors};

/// Subprocess budget for the initial error scan.
const SCAN_TIMEOUT_SECS: u64 = 300;
/// Subprocess budget for the re-encode.
const REENCODE_TIMEOUT_SECS: u64 = 300;

/// Outcome of sanitizing a clip.
#[derive(Debug, Clone, PartialEq)]
pub enum SanitizeOutcome {
    /// The clip decoded cleanly; use the original path.
    Clean(PathBuf),
    /// The clip was re-encoded; use the sibling sanitized path.
    Sanitized(PathBuf),
    /// The sanitized clip was too short to be usable.
    Rejected,
}

impl SanitizeOutcome {
    /// The usable path, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SanitizeOutcome::Clean(p) | SanitizeOutcome::Sanitized(p) => Some(p),
            SanitizeOutcome::Rejected => None,
        }
    }
}

/// Sanitize a clip before analysis.
///
/// Decodes the clip with a null sink collecting decoder diagnostics. If the
/// decode is clean the original path is returned. Otherwise the clip is
/// re-encoded with corrupt-frame discarding and PTS regeneration into a
/// sibling `{stem}_clean{ext}` file; a result shorter than
/// `min_duration_secs` is deleted and `Rejected` is returned.
///
/// Fails soft: any internal sanitizer error returns the original path rather
/// than blocking analysis.
pub async fn sanitize_clip(clip_path: impl AsRef<Path>, min_duration_secs: f64) -> MediaResult<SanitizeOutcome> {
    let clip_path = clip_path.as_ref();

    let report = match scan_decode_errors(clip_path, SCAN_TIMEOUT_SECS).await {
        Ok(report) => report,
        Err(e) => {
            warn!(clip = %clip_path.display(), "Clip probe failed: {e}");
            return Ok(SanitizeOutcome::Clean(clip_path.to_path_buf()));
        }
    };

    if report.is_clean() {
        info!(clip = %clip_path.display(), "Clip is clean (0 errors)");
        return Ok(SanitizeOutcome::Clean(clip_path.to_path_buf()));
    }

    warn!(
        clip = %clip_path.display(),
        errors = report.total(),
        "Clip has decode/DTS errors, re-encoding to sanitize"
    );

    let sanitized_path = sibling_clean_path(clip_path);

    let cmd = FfmpegCommand::new(clip_path, &sanitized_path)
        .input_args(["-err_detect", "careful"])
        .input_args(["-fflags", "+genpts+discardcorrupt"])
        .video_codec("libx264")
        .preset("fast")
        .crf(18)
        .no_audio()
        .output_args(["-movflags", "+faststart"]);

    if let Err(e) = FfmpegRunner::new()
        .with_timeout(REENCODE_TIMEOUT_SECS)
        .run(&cmd)
        .await
    {
        error!(clip = %clip_path.display(), "Re-encode failed: {e}");
        return Ok(SanitizeOutcome::Clean(clip_path.to_path_buf()));
    }

    let duration = get_duration(&sanitized_path).await.unwrap_or(0.0);
    if duration < min_duration_secs {
        error!(
            clip = %sanitized_path.display(),
            duration, min_duration_secs,
            "Sanitized clip is too short, rejecting"
        );
        let _ = tokio::fs::remove_file(&sanitized_path).await;
        return Ok(SanitizeOutcome::Rejected);
    }

    info!(clip = %sanitized_path.display(), duration, "Sanitized clip ready");
    Ok(SanitizeOutcome::Sanitized(sanitized_path))
}

/// `{dir}/{stem}_clean.{ext}` next to the original.
fn sibling_clean_path(clip_path: &Path) -> PathBuf {
    let stem = clip_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    let ext = clip_path
        .extension()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());
    clip_path.with_file_name(format!("{stem}_clean.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_clean_path() {
        let p = sibling_clean_path(Path::new("/clips/event_123.mp4"));
        assert_eq!(p, Path::new("/clips/event_123_clean.mp4"));
    }

    #[test]
    fn test_outcome_path() {
        let clean = SanitizeOutcome::Clean(PathBuf::from("/a.mp4"));
        assert_eq!(clean.path(), Some(Path::new("/a.mp4")));
        assert_eq!(SanitizeOutcome::Rejected.path(), None);
    }
}
