//! In-memory collaborators for pipeline tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, RgbImage};

use dframe_media::{
    frame_file_name, EncodeRequest, ExtractedFrames, FrameSource, MediaError, MediaResult,
    VideoEncoder,
};
use dframe_models::{AnalysisResult, JobId, StatusUpdate};
use dframe_queue::{QueueError, QueueResult, ResultStore, StatusSink};

/// Sink that records every update, optionally failing each call.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.snapshot().iter().map(|u| u.progress).collect()
    }

    pub fn last(&self) -> StatusUpdate {
        self.snapshot().pop().expect("no status published")
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish(&self, update: &StatusUpdate) -> QueueResult<()> {
        self.updates.lock().unwrap().push(update.clone());
        if self.fail {
            return Err(QueueError::connection_failed("sink down"));
        }
        Ok(())
    }
}

/// Status sink whose writes never finish.
pub struct HangingSink;

#[async_trait]
impl StatusSink for HangingSink {
    async fn publish(&self, _update: &StatusUpdate) -> QueueResult<()> {
        std::future::pending().await
    }
}

/// Result store in a map; the first `failures` writes are refused.
#[derive(Default)]
pub struct MemoryResultStore {
    results: Mutex<BTreeMap<String, AnalysisResult>>,
    failures: AtomicU32,
    store_calls: AtomicU32,
}

impl MemoryResultStore {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Default::default()
        }
    }

    pub fn get(&self, job_id: &JobId) -> Option<AnalysisResult> {
        self.results.lock().unwrap().get(job_id.as_str()).cloned()
    }

    pub fn insert(&self, job_id: &JobId, result: AnalysisResult) {
        self.results
            .lock()
            .unwrap()
            .insert(job_id.to_string(), result);
    }

    pub fn store_calls(&self) -> u32 {
        self.store_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn store(&self, job_id: &JobId, result: &AnalysisResult) -> QueueResult<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::connection_failed("store down"));
        }
        self.insert(job_id, result.clone());
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> QueueResult<Option<AnalysisResult>> {
        Ok(self.get(job_id))
    }
}

/// Blocky 64x64 grayscale noise; equal seeds give equal images.
pub fn noise_image(seed: u64) -> DynamicImage {
    let mut state = seed;
    let cells: Vec<u8> = (0..64)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        })
        .collect();
    let img = ImageBuffer::from_fn(64, 64, |x, y| Luma([cells[((y / 8) * 8 + x / 8) as usize]]));
    DynamicImage::ImageLuma8(img)
}

/// Frame source that writes one noise PNG per seed.
pub struct FakeFrameSource {
    seeds: Vec<u64>,
    limit_error: Option<String>,
}

impl FakeFrameSource {
    pub fn new(seeds: Vec<u64>) -> Self {
        Self {
            seeds,
            limit_error: None,
        }
    }

    pub fn over_limit(message: &str) -> Self {
        Self {
            seeds: Vec::new(),
            limit_error: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl FrameSource for FakeFrameSource {
    async fn extract(&self, video: &Path, output_dir: &Path, fps: f64) -> MediaResult<ExtractedFrames> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }
        if let Some(message) = &self.limit_error {
            return Err(MediaError::resource_limit(message.clone()));
        }
        std::fs::create_dir_all(output_dir)?;
        let mut frames = Vec::new();
        for (i, seed) in self.seeds.iter().enumerate() {
            let path = output_dir.join(frame_file_name(i as u32 + 1, 4, "png"));
            noise_image(*seed)
                .save(&path)
                .map_err(|e| MediaError::internal(e.to_string()))?;
            frames.push(path);
        }
        Ok(ExtractedFrames {
            frames,
            fps,
            duration: None,
        })
    }
}

/// What the encoder saw for one request.
#[derive(Debug, Clone)]
pub struct EncodeCall {
    pub request: EncodeRequest,
    /// Sequence file names present when encoding started, sorted
    pub frame_files: Vec<String>,
}

/// Encoder that records requests and writes a placeholder output.
#[derive(Default)]
pub struct RecordingEncoder {
    calls: Mutex<Vec<EncodeCall>>,
    with_audio: bool,
    fail_audio: bool,
    fail_encode: bool,
}

impl RecordingEncoder {
    pub fn with_audio() -> Self {
        Self {
            with_audio: true,
            ..Default::default()
        }
    }

    pub fn failing_audio() -> Self {
        Self {
            fail_audio: true,
            ..Default::default()
        }
    }

    pub fn failing_encode() -> Self {
        Self {
            fail_encode: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoEncoder for RecordingEncoder {
    async fn extract_audio(&self, _video: &Path, output: &Path) -> MediaResult<Option<PathBuf>> {
        if self.fail_audio {
            return Err(MediaError::ffmpeg_failed("audio extraction failed", None, Some(1)));
        }
        if !self.with_audio {
            return Ok(None);
        }
        std::fs::write(output, b"aac")?;
        Ok(Some(output.to_path_buf()))
    }

    async fn encode(&self, request: &EncodeRequest) -> MediaResult<PathBuf> {
        let mut frame_files: Vec<String> = std::fs::read_dir(&request.frames_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("frame_"))
            .collect();
        frame_files.sort();

        if self.fail_encode {
            self.calls.lock().unwrap().push(EncodeCall {
                request: request.clone(),
                frame_files,
            });
            return Err(MediaError::ffmpeg_failed("encode failed", None, Some(1)));
        }

        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.output, b"mp4")?;

        self.calls.lock().unwrap().push(EncodeCall {
            request: request.clone(),
            frame_files,
        });
        Ok(request.output.clone())
    }
}

/// Write a solid-color capture image for a cluster.
pub fn write_capture(dir: &Path, cluster_id: u32, ext: &str, size: (u32, u32), color: [u8; 3]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("cluster-{}.{}", cluster_id, ext));
    let img: RgbImage = ImageBuffer::from_pixel(size.0, size.1, Rgb(color));
    img.save(&path).unwrap();
    path
}
