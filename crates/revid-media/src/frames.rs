//! Frame extraction for per-frame classification.
//!
//! Frames are dumped to a JPEG sequence with FFmpeg and read back with the
//! `image` crate. Timestamps are derived from the sequence index and the
//! source fps, which is how the classifier aligns frames with trajectories.

use std::path::{Path, PathBuf};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// One extracted frame on disk.
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    /// JPEG path
    pub path: PathBuf,
    /// Zero-based index in the source clip (pre-sampling)
    pub frame_index: u64,
    /// Seconds from clip start
    pub timestamp: f64,
}

/// Extract every `step`-th frame of a clip into `out_dir`.
///
/// Returns the frames in timestamp order. `step` of 1 extracts every frame;
/// 2 extracts every other frame (used for clips over a minute).
pub async fn extract_frames(
    clip_path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    step: u32,
    timeout_secs: u64,
) -> MediaResult<Vec<ExtractedFrame>> {
    let clip_path = clip_path.as_ref();
    let out_dir = out_dir.as_ref();

    if step == 0 {
        return Err(MediaError::internal("frame step must be at least 1"));
    }

    let info = probe_video(clip_path).await?;
    if info.fps <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "non-positive fps for {}",
            clip_path.display()
        )));
    }

    tokio::fs::create_dir_all(out_dir).await?;

    let pattern = out_dir.join("frame_%06d.jpg");
    let mut cmd = FfmpegCommand::new(clip_path, &pattern).output_args(["-q:v", "2"]);
    if step > 1 {
        // select= keeps every step-th frame; -vsync vfr stops ffmpeg from
        // duplicating frames to fill the gaps
        cmd = cmd
            .video_filter(format!("select='not(mod(n\\,{step}))'"))
            .output_args(["-vsync", "vfr"]);
    }

    FfmpegRunner::new().with_timeout(timeout_secs).run(&cmd).await?;

    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(seq) = parse_sequence_number(&path) else {
            continue;
        };
        // FFmpeg numbers the sequence from 1; map back to source frame index
        let frame_index = (seq - 1) * step as u64;
        frames.push(ExtractedFrame {
            timestamp: frame_index as f64 / info.fps,
            frame_index,
            path,
        });
    }

    frames.sort_by(|a, b| a.frame_index.cmp(&b.frame_index));
    Ok(frames)
}

/// Extract the single frame nearest `timestamp` to `out_path` (JPEG).
pub async fn extract_frame_at(
    clip_path: impl AsRef<Path>,
    timestamp: f64,
    out_path: impl AsRef<Path>,
    timeout_secs: u64,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(clip_path.as_ref(), out_path.as_ref())
        .seek(timestamp.max(0.0))
        .single_frame()
        .output_args(["-q:v", "2"]);
    FfmpegRunner::new().with_timeout(timeout_secs).run(&cmd).await?;
    Ok(())
}

/// Parse the `%06d` sequence number out of a `frame_NNNNNN.jpg` path.
fn parse_sequence_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix("frame_")?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(parse_sequence_number(Path::new("/tmp/frame_000001.jpg")), Some(1));
        assert_eq!(parse_sequence_number(Path::new("/tmp/frame_000432.jpg")), Some(432));
        assert_eq!(parse_sequence_number(Path::new("/tmp/other.jpg")), None);
    }
}
