//! FFmpeg CLI wrappers for the clip analysis pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout and cancellation
//! - FFprobe metadata and decode-error scanning
//! - Clip sanitizing (re-encode around corrupt frames and broken DTS)
//! - Frame extraction to JPEG sequences for per-frame classification
//! - Crop extraction for ReID embedding and training-frame export
//! - The clip retrieval service seam

pub mod clipsvc;
pub mod command;
pub mod crops;
pub mod error;
pub mod frames;
pub mod probe;
pub mod sanitize;

pub use clipsvc::{ClipProbe, ClipService, FetchedClip, LocalClipService};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use crops::save_crop;
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frames, ExtractedFrame};
pub use probe::{probe_video, scan_decode_errors, DecodeReport, VideoInfo};
pub use sanitize::{sanitize_clip, SanitizeOutcome};
