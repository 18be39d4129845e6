//! FFprobe video information and decoder diagnostics.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Result of a null-sink decode over a clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeReport {
    /// h264 "error while decoding" lines
    pub decode_errors: u32,
    /// "non monotonically increasing dts" warnings
    pub dts_warnings: u32,
    /// The matching stderr lines, for diagnostics
    pub error_lines: Vec<String>,
}

impl DecodeReport {
    /// True when the clip decoded without diagnostics.
    pub fn is_clean(&self) -> bool {
        self.decode_errors == 0 && self.dts_warnings == 0
    }

    /// Total diagnostic count.
    pub fn total(&self) -> u32 {
        self.decode_errors + self.dts_warnings
    }
}

/// Decode a clip to the null sink and collect decoder diagnostics.
pub async fn scan_decode_errors(path: impl AsRef<Path>, timeout_secs: u64) -> MediaResult<DecodeReport> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let stderr = FfmpegRunner::new()
        .with_timeout(timeout_secs)
        .run(&FfmpegCommand::null_decode(path))
        .await?;

    Ok(parse_decode_report(&stderr))
}

fn parse_decode_report(stderr: &str) -> DecodeReport {
    let mut decode_errors = 0u32;
    let mut dts_warnings = 0u32;
    let mut error_lines = Vec::new();

    for line in stderr.lines() {
        let is_decode = line.contains("error while decoding");
        let is_dts = line.contains("non monotonically increasing dts");
        if is_decode {
            decode_errors += 1;
        }
        if is_dts {
            dts_warnings += 1;
        }
        if is_decode || is_dts {
            error_lines.push(line.to_string());
        }
    }

    DecodeReport {
        decode_errors,
        dts_warnings,
        error_lines,
    }
}

/// Get video duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_video(path).await?;
    Ok(info.duration)
}

/// Parse a frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_decode_report() {
        let stderr = "\
[h264 @ 0x1] error while decoding MB 10 22\n\
[mp4 @ 0x2] non monotonically increasing dts to muxer\n\
frame dropped\n\
[h264 @ 0x1] error while decoding MB 4 7\n";
        let report = parse_decode_report(stderr);
        assert_eq!(report.decode_errors, 2);
        assert_eq!(report.dts_warnings, 1);
        assert_eq!(report.error_lines.len(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_clean_report() {
        let report = parse_decode_report("");
        assert!(report.is_clean());
        assert_eq!(report.total(), 0);
    }
}
