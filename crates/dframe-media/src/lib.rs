//! FFmpeg CLI wrapper for DanceFrame.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Frame extraction with duration and frame-count limits
//! - Image sequence encoding with an optional audio track

pub mod command;
pub mod encode;
pub mod error;
pub mod frames;
pub mod hwaccel;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encode::{EncodeRequest, FfmpegEncoder, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use frames::{
    frame_file_name, frame_pad_width, frame_pattern, ExtractedFrames, ExtractionConfig,
    FfmpegFrameExtractor, FrameSource,
};
pub use hwaccel::HwAccelMode;
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
