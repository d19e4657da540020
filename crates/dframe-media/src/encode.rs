//! Image sequence encoding.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use dframe_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// A numbered image sequence to encode.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Directory holding the sequence
    pub frames_dir: PathBuf,
    /// FFmpeg pattern for the sequence, e.g. `frame_%04d.png`
    pub pattern: String,
    /// Number of images, numbered from 0
    pub frame_count: u32,
    /// Optional audio track to mux in
    pub audio: Option<PathBuf>,
    /// Output video path
    pub output: PathBuf,
    /// Codec and rate settings
    pub encoding: EncodingConfig,
}

/// Turns image sequences into videos.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Extract the source's audio track to `output`.
    ///
    /// Returns `None` when the source has no audio.
    async fn extract_audio(&self, video: &Path, output: &Path) -> MediaResult<Option<PathBuf>>;

    /// Encode the sequence and return the output path.
    async fn encode(&self, request: &EncodeRequest) -> MediaResult<PathBuf>;
}

/// Encoder backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    timeout_secs: Option<u64>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        match self.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        }
    }
}

/// Build the encode command for a request.
pub fn encode_command(request: &EncodeRequest) -> FfmpegCommand {
    let encoding = &request.encoding;
    let mut cmd = FfmpegCommand::new(request.frames_dir.join(&request.pattern), &request.output)
        .input_framerate(encoding.fps)
        .start_number(0);

    if let Some(audio) = &request.audio {
        cmd = cmd.additional_input(audio);
    }

    cmd = cmd
        .video_codec(encoding.codec.clone())
        .pixel_format(encoding.pixel_format.clone());
    if let Some(crf) = encoding.crf {
        cmd = cmd.crf(crf);
    }
    if request.audio.is_some() {
        cmd = cmd.audio_codec(encoding.audio_codec.clone()).shortest();
    }
    cmd.output_args(encoding.extra_args.iter().cloned())
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn extract_audio(&self, video: &Path, output: &Path) -> MediaResult<Option<PathBuf>> {
        let info = probe_video(video).await?;
        if !info.has_audio() {
            debug!(video = %video.display(), "Source has no audio track");
            return Ok(None);
        }

        let cmd = FfmpegCommand::new(video, output)
            .no_video()
            .audio_codec("aac");
        self.runner().run(&cmd).await?;

        if !output.exists() {
            return Err(MediaError::ffmpeg_failed(
                "Audio extraction produced no output",
                None,
                None,
            ));
        }
        Ok(Some(output.to_path_buf()))
    }

    async fn encode(&self, request: &EncodeRequest) -> MediaResult<PathBuf> {
        if request.frame_count == 0 {
            return Err(MediaError::invalid_video("Cannot encode an empty frame sequence"));
        }
        if !request.encoding.has_valid_fps() {
            return Err(MediaError::invalid_video(format!(
                "Invalid output frame rate: {}",
                request.encoding.fps
            )));
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = encode_command(request);
        info!(
            frames = request.frame_count,
            fps = request.encoding.fps,
            audio = request.audio.is_some(),
            output = %request.output.display(),
            "Encoding video"
        );
        let total = request.frame_count as u64;
        self.runner()
            .run_with_progress(&cmd, move |p| {
                debug!(percent = p.frame_percentage(total), "Encode progress")
            })
            .await?;

        if !request.output.exists() {
            return Err(MediaError::ffmpeg_failed(
                "Encoder produced no output file",
                None,
                None,
            ));
        }
        Ok(request.output.clone())
    }
}
