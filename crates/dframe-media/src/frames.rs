//! Frame extraction.
//!
//! Frames are written as `frame_NNNN.jpg` with a fixed zero-pad width wide
//! enough for the frame cap, so sorting by file name gives sequence order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::hwaccel::{self, HwAccelMode};
use crate::probe::probe_video;

/// Highest extraction frame rate accepted.
pub const MAX_EXTRACT_FPS: f64 = 60.0;
pub const DEFAULT_MAX_FRAMES: u32 = 3600;
pub const DEFAULT_MAX_DURATION_SECS: f64 = 300.0;

const FRAME_PREFIX: &str = "frame_";
const EXTRACT_EXTENSION: &str = "jpg";

/// Zero-pad width for frame numbers up to `max_frames`.
pub fn frame_pad_width(max_frames: u32) -> usize {
    max_frames.to_string().len().max(4)
}

/// FFmpeg sequence pattern, e.g. `frame_%04d.jpg`.
pub fn frame_pattern(width: usize, extension: &str) -> String {
    format!("{}%0{}d.{}", FRAME_PREFIX, width, extension)
}

/// Concrete file name for sequence number `n`.
pub fn frame_file_name(n: u32, width: usize, extension: &str) -> String {
    format!("{}{:0width$}.{}", FRAME_PREFIX, n, extension, width = width)
}

/// Frame extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Default extraction rate (capped at 60)
    pub fps: f64,
    /// Maximum number of frames to extract
    pub max_frames: u32,
    /// Maximum source duration in seconds
    pub max_duration_secs: f64,
    /// FFmpeg decoder threads
    pub threads: usize,
    /// Hardware decode setting
    pub hw_accel: HwAccelMode,
    /// FFmpeg timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fps: MAX_EXTRACT_FPS,
            max_frames: DEFAULT_MAX_FRAMES,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            threads: num_cpus::get(),
            hw_accel: HwAccelMode::Auto,
            timeout_secs: None,
        }
    }
}

impl ExtractionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fps: std::env::var("FRAME_EXTRACT_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fps),
            max_frames: std::env::var("FRAME_MAX_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_frames),
            max_duration_secs: std::env::var("FRAME_MAX_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_duration_secs),
            threads: std::env::var("FFMPEG_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.threads),
            hw_accel: std::env::var("FFMPEG_HW_ACCEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hw_accel),
            timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Decide the extraction rate for a source of known or unknown duration.
    ///
    /// Returns `ResourceLimit` when the source is too long. When the
    /// estimated frame count would exceed the cap, the rate is lowered so
    /// the whole clip still fits.
    pub fn plan_fps(&self, requested: f64, duration: Option<f64>) -> MediaResult<f64> {
        if !requested.is_finite() || requested <= 0.0 {
            return Err(MediaError::invalid_video(format!(
                "Invalid extraction frame rate: {}",
                requested
            )));
        }
        let mut fps = requested.min(MAX_EXTRACT_FPS);

        if let Some(duration) = duration {
            if duration > self.max_duration_secs {
                return Err(MediaError::resource_limit(format!(
                    "Video duration {:.1}s exceeds maximum {:.0}s",
                    duration, self.max_duration_secs
                )));
            }
            let estimated = duration * fps;
            if estimated > self.max_frames as f64 {
                let reduced = self.max_frames as f64 / duration;
                warn!(
                    estimated_frames = estimated as u64,
                    max_frames = self.max_frames,
                    "Reducing extraction rate from {:.2} to {:.2} fps",
                    fps,
                    reduced
                );
                fps = reduced;
            }
        }
        Ok(fps)
    }
}

/// Extracted frame files in sequence order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrames {
    pub frames: Vec<PathBuf>,
    /// Rate actually used
    pub fps: f64,
    /// Source duration, when known
    pub duration: Option<f64>,
}

/// Produces an ordered, densely numbered sequence of frame images.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn extract(&self, video: &Path, output_dir: &Path, fps: f64) -> MediaResult<ExtractedFrames>;
}

/// Frame extractor backed by the FFmpeg CLI.
pub struct FfmpegFrameExtractor {
    config: ExtractionConfig,
    hwaccel: OnceCell<Option<String>>,
}

impl FfmpegFrameExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            hwaccel: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    async fn hwaccel_method(&self) -> Option<String> {
        self.hwaccel
            .get_or_init(|| hwaccel::resolve(self.config.hw_accel))
            .await
            .clone()
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameExtractor {
    async fn extract(&self, video: &Path, output_dir: &Path, fps: f64) -> MediaResult<ExtractedFrames> {
        if !tokio::fs::try_exists(video).await? {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }

        let duration = match probe_video(video).await {
            Ok(info) => info.duration,
            Err(e @ MediaError::InvalidVideo(_)) => return Err(e),
            Err(e) => {
                warn!("Could not probe video, extracting without limits check: {}", e);
                None
            }
        };
        let fps = self.config.plan_fps(fps, duration)?;

        tokio::fs::create_dir_all(output_dir).await?;

        let width = frame_pad_width(self.config.max_frames);
        let pattern = output_dir.join(frame_pattern(width, EXTRACT_EXTENSION));

        let mut cmd = FfmpegCommand::new(video, &pattern);
        if let Some(method) = self.hwaccel_method().await {
            cmd = cmd.hwaccel(method);
        }
        let cmd = cmd
            .threads(self.config.threads)
            .video_filter(format!("fps={}", fps))
            .quality_scale(3)
            .max_frames(self.config.max_frames);

        info!(
            video = %video.display(),
            fps,
            duration = ?duration,
            "Extracting frames"
        );

        let mut runner = FfmpegRunner::new();
        if let Some(timeout) = self.config.timeout_secs {
            runner = runner.with_timeout(timeout);
        }
        runner
            .run_with_progress(&cmd, |p| debug!(frame = p.frame, "Extraction progress"))
            .await?;

        let frames = list_frames(output_dir, EXTRACT_EXTENSION).await?;
        if frames.is_empty() {
            return Err(MediaError::invalid_video("No frames extracted from video"));
        }

        info!(count = frames.len(), "Extracted frames");
        Ok(ExtractedFrames {
            frames,
            fps,
            duration,
        })
    }
}

/// List `frame_*.{ext}` files in a directory, sorted by file name.
pub async fn list_frames(dir: &Path, extension: &str) -> MediaResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(FRAME_PREFIX)
            && Path::new(name.as_ref())
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            frames.push(entry.path());
        }
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pad_width() {
        assert_eq!(frame_pad_width(3600), 4);
        assert_eq!(frame_pad_width(10), 4);
        assert_eq!(frame_pad_width(10000), 5);
        assert_eq!(frame_pad_width(250_000), 6);
    }

    #[test]
    fn test_names_sort_numerically() {
        let width = frame_pad_width(20000);
        let mut names: Vec<_> = [9u32, 10, 100, 19999, 2]
            .iter()
            .map(|&n| frame_file_name(n, width, "jpg"))
            .collect();
        names.sort();
        assert_eq!(names[0], "frame_00002.jpg");
        assert_eq!(names[4], "frame_19999.jpg");
        assert_eq!(frame_pattern(width, "png"), "frame_%05d.png");
    }

    #[test]
    fn test_plan_fps_caps_rate() {
        let config = ExtractionConfig::default();
        assert_eq!(config.plan_fps(120.0, None).unwrap(), MAX_EXTRACT_FPS);
        assert_eq!(config.plan_fps(24.0, Some(10.0)).unwrap(), 24.0);
    }

    #[test]
    fn test_plan_fps_reduces_for_frame_cap() {
        let config = ExtractionConfig {
            max_frames: 3600,
            ..Default::default()
        };
        // 120s at 60fps would be 7200 frames.
        let fps = config.plan_fps(60.0, Some(120.0)).unwrap();
        assert!((fps - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_fps_rejects_long_video() {
        let config = ExtractionConfig::default();
        let err = config.plan_fps(30.0, Some(301.0)).unwrap_err();
        assert!(matches!(err, MediaError::ResourceLimit(_)));
    }

    #[test]
    fn test_plan_fps_rejects_bad_rate() {
        let config = ExtractionConfig::default();
        assert!(config.plan_fps(0.0, None).is_err());
        assert!(config.plan_fps(f64::NAN, None).is_err());
    }

    #[tokio::test]
    async fn test_list_frames_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["frame_0003.jpg", "frame_0001.jpg", "frame_0002.JPG", "other.jpg", "frame_0004.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let frames = list_frames(dir.path(), "jpg").await.unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame_0001.jpg", "frame_0002.JPG", "frame_0003.jpg"]);
    }

    #[tokio::test]
    async fn test_extract_missing_video() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("frames");
        let extractor = FfmpegFrameExtractor::new(ExtractionConfig::default());
        let err = extractor
            .extract(&dir.path().join("missing.mp4"), &out, 30.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(!tokio::fs::try_exists(&out).await.unwrap());
    }
}
