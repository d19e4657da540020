//! Video composition: rebuild the frame sequence from user captures and
//! encode it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use dframe_analysis::{expand, ExpansionPlan, GapPolicy};
use dframe_media::{frame_file_name, frame_pad_width, frame_pattern, EncodeRequest, VideoEncoder};
use dframe_models::capture::cluster_stem;
use dframe_models::{EncodingConfig, JobId, StatusChannel};
use dframe_queue::{GenerateVideoJob, ResultStore, StatusSink};
use dframe_storage::{scan_captures, StorageError, StorageLayout};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{ProgressReporter, DEFAULT_PUBLISH_TIMEOUT};

const SEQUENCE_EXTENSION: &str = "png";
const AUDIO_FILE_NAME: &str = "audio.aac";

/// Runs generation jobs end to end.
pub struct CompositionPipeline {
    layout: StorageLayout,
    results: Arc<dyn ResultStore>,
    encoder: Arc<dyn VideoEncoder>,
    status: Arc<dyn StatusSink>,
    gap_policy: GapPolicy,
    encoding: EncodingConfig,
    timeout: Option<Duration>,
    status_timeout: Duration,
}

impl CompositionPipeline {
    pub fn new(
        layout: StorageLayout,
        results: Arc<dyn ResultStore>,
        encoder: Arc<dyn VideoEncoder>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            layout,
            results,
            encoder,
            status,
            gap_policy: GapPolicy::default(),
            encoding: EncodingConfig::default(),
            timeout: None,
            status_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound on each status write.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Compose the video for `job` and return its public URL.
    pub async fn run(&self, job: &GenerateVideoJob) -> WorkerResult<String> {
        let logger = JobLogger::new(&job.job_id, "generate_video");
        let progress = ProgressReporter::new(
            Arc::clone(&self.status),
            job.job_id.clone(),
            StatusChannel::Generation,
        )
        .with_publish_timeout(self.status_timeout);
        logger.log_start("video composition");

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute(job, &progress, &logger))
                .await
                .unwrap_or(Err(WorkerError::Timeout(limit.as_secs()))),
            None => self.execute(job, &progress, &logger).await,
        };
        // Also reached after a failure or timeout mid-render.
        self.discard_sequence(&job.job_id, &logger).await;

        match result {
            Ok(url) => {
                logger.log_completion(&url);
                Ok(url)
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                progress.fail(e.user_message()).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &GenerateVideoJob,
        progress: &ProgressReporter,
        logger: &JobLogger,
    ) -> WorkerResult<String> {
        let job_id = &job.job_id;
        progress.step(0, "Initializing composition...").await;

        let analysis = self.results.load(job_id).await?.ok_or_else(|| {
            WorkerError::invalid_input("Analysis result not found. Please re-analyze video.")
        })?;
        if !analysis.frame_mapping.is_dense() {
            logger.log_warning("stored frame mapping has gaps");
        }

        let captures = match scan_captures(&self.layout.captures_dir(job_id)?).await {
            Ok(captures) => captures,
            Err(StorageError::NotFound(_)) => {
                return Err(WorkerError::invalid_input("No captures uploaded for this job"))
            }
            Err(e) => return Err(e.into()),
        };

        progress.step(20, "Composing video sequence...").await;
        let plan = expand(&analysis.frame_mapping, &captures, self.gap_policy)?;
        if plan.skipped() > 0 {
            metrics::record_frames_skipped(plan.skipped());
            logger.log_warning(&format!(
                "{} of {} frames skipped, clusters without captures: {:?}",
                plan.skipped(),
                plan.len() + plan.skipped(),
                plan.missing_clusters()
            ));
        }

        let sequence_dir = self.layout.sequence_dir(job_id)?;
        if tokio::fs::try_exists(&sequence_dir).await? {
            tokio::fs::remove_dir_all(&sequence_dir).await?;
        }
        tokio::fs::create_dir_all(&sequence_dir).await?;

        self.render(job, plan, &sequence_dir, logger).await?;

        let url = self.layout.final_video_url(job_id);
        progress
            .complete("Video generated successfully", Some(url.clone()))
            .await;
        Ok(url)
    }

    async fn discard_sequence(&self, job_id: &JobId, logger: &JobLogger) {
        let Ok(dir) = self.layout.sequence_dir(job_id) else {
            return;
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => logger.log_warning(&format!("could not remove sequence directory: {}", e)),
        }
    }

    /// Write the sequence into `sequence_dir` and encode it.
    async fn render(
        &self,
        job: &GenerateVideoJob,
        plan: ExpansionPlan,
        sequence_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let job_id = &job.job_id;
        let width = frame_pad_width(plan.len() as u32);
        let frame_count = plan.len() as u32;
        let capture_count = plan.used_clusters().len();
        {
            let dir = sequence_dir.to_path_buf();
            tokio::task::spawn_blocking(move || write_sequence(&plan, &dir, width))
                .await
                .map_err(|e| WorkerError::processing_failed(format!("Sequence task failed: {}", e)))??;
        }
        logger.log_progress(
            20,
            &format!("wrote {} sequence frames from {} captures", frame_count, capture_count),
        );

        let audio = self.extract_audio(job, sequence_dir, logger).await;

        let fps = job.fps.unwrap_or(self.encoding.fps);
        let request = EncodeRequest {
            frames_dir: sequence_dir.to_path_buf(),
            pattern: frame_pattern(width, SEQUENCE_EXTENSION),
            frame_count,
            audio,
            output: self.layout.final_video_path(job_id)?,
            encoding: self.encoding.clone().with_fps(fps),
        };
        if !request.encoding.has_valid_fps() {
            return Err(WorkerError::invalid_input(format!("Invalid frame rate: {}", fps)));
        }
        self.encoder.encode(&request).await?;
        Ok(())
    }

    /// Best-effort copy of the source audio track.
    async fn extract_audio(
        &self,
        job: &GenerateVideoJob,
        dir: &Path,
        logger: &JobLogger,
    ) -> Option<PathBuf> {
        let video = match self.layout.find_original(&job.job_id).await {
            Ok(video) => video,
            Err(e) => {
                logger.log_warning(&format!("original video unavailable, no audio: {}", e));
                return None;
            }
        };
        match self.encoder.extract_audio(&video, &dir.join(AUDIO_FILE_NAME)).await {
            Ok(audio) => audio,
            Err(e) => {
                logger.log_warning(&format!("audio extraction failed, continuing without audio: {}", e));
                None
            }
        }
    }
}

/// Materialize the plan as `frame_NNNN.png` files numbered from 0.
///
/// Each capture is decoded once, converted to PNG and scaled to the size of
/// the first capture used (rounded down to even dimensions), then copied to
/// every slot that uses it.
fn write_sequence(plan: &ExpansionPlan, dir: &Path, width: usize) -> WorkerResult<()> {
    let mut target: Option<(u32, u32)> = None;
    let mut normalized: BTreeMap<u32, PathBuf> = BTreeMap::new();

    for entry in &plan.entries {
        let source = match normalized.get(&entry.cluster_id) {
            Some(path) => path.clone(),
            None => {
                let image = image::open(&entry.source).map_err(|e| {
                    WorkerError::invalid_input(format!(
                        "Unreadable capture for cluster {}: {}",
                        entry.cluster_id, e
                    ))
                })?;
                let size = *target.get_or_insert_with(|| even_dimensions(image.dimensions()));
                let path = dir.join(format!("{}.{}", cluster_stem(entry.cluster_id), SEQUENCE_EXTENSION));
                fit(image, size)
                    .save_with_format(&path, ImageFormat::Png)
                    .map_err(|e| {
                        WorkerError::processing_failed(format!(
                            "Failed to write capture for cluster {}: {}",
                            entry.cluster_id, e
                        ))
                    })?;
                normalized.insert(entry.cluster_id, path.clone());
                path
            }
        };
        std::fs::copy(
            &source,
            dir.join(frame_file_name(entry.output_index, width, SEQUENCE_EXTENSION)),
        )?;
    }
    Ok(())
}

/// H.264 with yuv420p needs even dimensions.
fn even_dimensions((w, h): (u32, u32)) -> (u32, u32) {
    ((w & !1).max(2), (h & !1).max(2))
}

fn fit(image: DynamicImage, (w, h): (u32, u32)) -> DynamicImage {
    if image.dimensions() == (w, h) {
        image
    } else {
        image.resize_exact(w, h, FilterType::Lanczos3)
    }
}
