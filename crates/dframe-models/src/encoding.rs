//! Video encoding configuration for composed output.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Pixel format accepted by every common player
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Default output frame rate
pub const DEFAULT_FPS: f64 = 24.0;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Audio codec used when a source audio track is attached
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Constant Rate Factor (quality, 0-51, lower is better); encoder default when unset
    #[serde(default)]
    pub crf: Option<u8>,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}
fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            crf: None,
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Copy of this config at a different frame rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    /// Whether the frame rate is usable.
    pub fn has_valid_fps(&self) -> bool {
        self.fps.is_finite() && self.fps > 0.0 && self.fps <= 120.0
    }
}
