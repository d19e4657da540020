//! Video analysis: extract frames, hash, cluster and publish thumbnails.

use std::sync::Arc;
use std::time::Duration;

use dframe_analysis::{
    has_uniform_name_width, order_frames, select_representatives, FrameClusterer, PerceptualHasher,
};
use dframe_media::FrameSource;
use dframe_models::{AnalysisResult, ClusterInfo, JobId, StatusChannel};
use dframe_queue::{AnalyzeVideoJob, ResultStore, StatusSink};
use dframe_storage::{StorageLayout, ThumbnailWriter};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{ProgressReporter, DEFAULT_PUBLISH_TIMEOUT};
use crate::retry::{retry_async, RetryConfig};

/// Runs analysis jobs end to end.
pub struct AnalysisPipeline {
    layout: StorageLayout,
    frames: Arc<dyn FrameSource>,
    hasher: PerceptualHasher,
    clusterer: FrameClusterer,
    thumbnails: Arc<dyn ThumbnailWriter>,
    results: Arc<dyn ResultStore>,
    status: Arc<dyn StatusSink>,
    extract_fps: f64,
    timeout: Option<Duration>,
    status_timeout: Duration,
    store_retry: RetryConfig,
}

impl AnalysisPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: StorageLayout,
        frames: Arc<dyn FrameSource>,
        hasher: PerceptualHasher,
        clusterer: FrameClusterer,
        thumbnails: Arc<dyn ThumbnailWriter>,
        results: Arc<dyn ResultStore>,
        status: Arc<dyn StatusSink>,
        extract_fps: f64,
    ) -> Self {
        Self {
            layout,
            frames,
            hasher,
            clusterer,
            thumbnails,
            results,
            status,
            extract_fps,
            timeout: None,
            status_timeout: DEFAULT_PUBLISH_TIMEOUT,
            store_retry: RetryConfig::new("store_analysis_result"),
        }
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

    pub fn with_store_retry(mut self, retry: RetryConfig) -> Self {
        self.store_retry = retry;
        self
    }

    /// Analyze the uploaded video of `job`.
    ///
    /// Any failure is written to the status sink before being returned.
    pub async fn run(&self, job: &AnalyzeVideoJob) -> WorkerResult<AnalysisResult> {
        let logger = JobLogger::new(&job.job_id, "analyze_video");
        let progress =
            ProgressReporter::new(Arc::clone(&self.status), job.job_id.clone(), StatusChannel::Analysis)
                .with_publish_timeout(self.status_timeout);
        logger.log_start("video analysis");

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute(job, &progress, &logger))
                .await
                .unwrap_or(Err(WorkerError::Timeout(limit.as_secs()))),
            None => self.execute(job, &progress, &logger).await,
        };

        match result {
            Ok(result) => {
                logger.log_completion(&format!(
                    "{} frames in {} clusters",
                    result.total_frames(),
                    result.clusters.len()
                ));
                Ok(result)
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
        job: &AnalyzeVideoJob,
        progress: &ProgressReporter,
        logger: &JobLogger,
    ) -> WorkerResult<AnalysisResult> {
        let job_id = &job.job_id;
        progress.step(0, "Starting video analysis...").await;

        let video = self.layout.find_original(job_id).await?;
        let frames_dir = self.layout.frames_dir(job_id)?;
        if tokio::fs::try_exists(&frames_dir).await? {
            // Leftovers from an earlier attempt would be hashed too.
            tokio::fs::remove_dir_all(&frames_dir).await?;
        }

        progress.step(10, "Extracting frames from video...").await;
        logger.log_progress(10, "extracting frames");
        let fps = job.extract_fps.unwrap_or(self.extract_fps);
        let extracted = self.frames.extract(&video, &frames_dir, fps).await?;
        if extracted.frames.is_empty() {
            return Err(WorkerError::invalid_input("No frames extracted from video"));
        }

        let frames = order_frames(extracted.frames);
        if !has_uniform_name_width(&frames) {
            logger.log_warning("frame names differ in width; lexicographic order may not match numeric order");
        }

        progress.step(30, "Computing perceptual hashes (pHash)...").await;
        logger.log_progress(30, &format!("hashing {} frames at {:.2} fps", frames.len(), extracted.fps));
        let hasher = self.hasher.clone();
        let hashed = tokio::task::spawn_blocking(move || hasher.hash_frames(frames))
            .await
            .map_err(|e| WorkerError::processing_failed(format!("Hashing task failed: {}", e)))??;
        metrics::record_frames_hashed(hashed.len());

        let clustering = self.clusterer.cluster(hashed)?;
        metrics::record_clusters(clustering.cluster_count());

        progress
            .step(
                60,
                format!("Generating thumbnails ({} clusters)...", clustering.cluster_count()),
            )
            .await;
        let clusters = self.write_thumbnails(job_id, &clustering).await?;

        let result = AnalysisResult {
            clusters,
            frame_mapping: clustering.mapping,
        };
        result
            .validate()
            .map_err(WorkerError::invariant_violation)?;

        progress.step(90, "Finalizing analysis results...").await;
        self.persist(job_id, &result).await?;

        progress.complete("Analysis completed successfully", None).await;
        Ok(result)
    }

    async fn write_thumbnails(
        &self,
        job_id: &JobId,
        clustering: &dframe_analysis::Clustering,
    ) -> WorkerResult<Vec<ClusterInfo>> {
        let mut clusters = Vec::with_capacity(clustering.cluster_count());
        for rep in select_representatives(clustering) {
            let thumbnail_url = self
                .thumbnails
                .write(job_id, rep.cluster_id, &rep.frame.path)
                .await?;
            clusters.push(ClusterInfo {
                id: rep.cluster_id,
                size: rep.size,
                thumbnail_url,
            });
        }
        if clusters.len() != clustering.cluster_count() {
            return Err(WorkerError::invariant_violation(format!(
                "{} clusters but {} representatives",
                clustering.cluster_count(),
                clusters.len()
            )));
        }
        Ok(clusters)
    }

    /// Store the result, retrying with backoff.
    async fn persist(&self, job_id: &JobId, result: &AnalysisResult) -> WorkerResult<()> {
        let outcome = retry_async(&self.store_retry, || self.results.store(job_id, result)).await;
        let attempts = outcome.attempts();
        if attempts > 1 {
            metrics::record_result_store_retries(attempts - 1);
        }
        outcome.into_result().map_err(|e| {
            WorkerError::dependency_unavailable(format!(
                "Failed to store analysis result after {} attempts: {}",
                attempts, e
            ))
        })
    }
}
