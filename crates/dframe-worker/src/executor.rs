//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use dframe_analysis::{FrameClusterer, PerceptualHasher};
use dframe_media::{FfmpegEncoder, FfmpegFrameExtractor};
use dframe_models::EncodingConfig;
use dframe_queue::{
    CleanupJob, JobQueue, QueueError, QueueJob, RedisResultStore, RedisStatusStore, ResultStore,
    StatusSink,
};
use dframe_storage::{LocalThumbnailWriter, RetentionPolicy, StorageLayout};

use crate::analysis::AnalysisPipeline;
use crate::cleanup::run_cleanup;
use crate::composition::CompositionPipeline;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::FailureTracker;

/// Everything needed to run any job kind.
pub struct ProcessingContext {
    analysis: AnalysisPipeline,
    composition: CompositionPipeline,
    layout: StorageLayout,
    retention: RetentionPolicy,
}

impl ProcessingContext {
    pub fn new(
        analysis: AnalysisPipeline,
        composition: CompositionPipeline,
        layout: StorageLayout,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            analysis,
            composition,
            layout,
            retention,
        }
    }

    /// Wire the production collaborators: ffmpeg, local storage and Redis.
    pub fn from_config(config: &WorkerConfig, redis_url: &str) -> WorkerResult<Self> {
        let layout = config.layout.clone();
        let status: Arc<dyn StatusSink> =
            Arc::new(RedisStatusStore::new(redis_url)?.with_timeout(config.status_timeout));
        let results: Arc<dyn ResultStore> = Arc::new(
            RedisResultStore::new(redis_url)?
                .with_ttl(config.result_ttl_secs)
                .with_timeout(config.status_timeout),
        );

        let analysis = AnalysisPipeline::new(
            layout.clone(),
            Arc::new(FfmpegFrameExtractor::new(config.extraction.clone())),
            PerceptualHasher::new(&config.hasher)?,
            FrameClusterer::new(config.clustering),
            Arc::new(LocalThumbnailWriter::new(layout.clone())),
            Arc::clone(&results),
            Arc::clone(&status),
            config.extraction.fps,
        )
        .with_timeout(config.job_timeout)
        .with_status_timeout(config.status_timeout);

        let encoder = FfmpegEncoder::new().with_timeout(config.job_timeout.as_secs());
        let composition = CompositionPipeline::new(layout.clone(), results, Arc::new(encoder), status)
            .with_gap_policy(config.gap_policy)
            .with_encoding(EncodingConfig::default().with_fps(config.output_fps))
            .with_timeout(config.job_timeout)
            .with_status_timeout(config.status_timeout);

        Ok(Self::new(analysis, composition, layout, config.retention))
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Process a single job.
    pub async fn process(&self, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::AnalyzeVideo(j) => self.analysis.run(j).await.map(|_| ()),
            QueueJob::GenerateVideo(j) => self.composition.run(j).await.map(|_| ()),
            QueueJob::Cleanup(j) => run_cleanup(&self.layout, self.retention, j).await.map(|_| ()),
        }
    }
}

/// What the executor does with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Leave the message pending so it is claimed and run again
    Retry,
    /// Move the message to the dead letter stream
    DeadLetter,
}

/// Decide between another attempt and the DLQ.
///
/// `retry_count` is the count after recording this failure.
pub fn failure_action(error: &WorkerError, retry_count: u32, max_retries: u32) -> FailureAction {
    if error.is_permanent_failure() || !error.is_retryable() || retry_count >= max_retries {
        FailureAction::DeadLetter
    } else {
        FailureAction::Retry
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<ProcessingContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create an executor with production collaborators.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> WorkerResult<Self> {
        let ctx = ProcessingContext::from_config(&config, &queue.config().redis_url)?;
        Ok(Self::with_context(config, queue, ctx))
    }

    pub fn with_context(config: WorkerConfig, queue: JobQueue, ctx: ProcessingContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor. Returns after [`shutdown`](Self::shutdown) once
    /// in-flight jobs finish or the shutdown timeout passes.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;
        self.ctx.layout().ensure_roots().await?;

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.ctx),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.claim_interval,
            self.config.claim_min_idle,
            self.shutdown.subscribe(),
        ));
        let cleanup_task = tokio::spawn(Self::cleanup_schedule(
            Arc::clone(&self.queue),
            self.config.cleanup_interval,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut consume_failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => consume_failures.record_success(),
                        Err(e) => {
                            if consume_failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();
        cleanup_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Shutdown timeout reached with jobs still running");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and dispatch jobs up to the free job slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::processing_failed("Semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Periodically take over jobs left pending by crashed workers.
    async fn claim_loop(
        queue: Arc<JobQueue>,
        ctx: Arc<ProcessingContext>,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        interval: Duration,
        min_idle: Duration,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let jobs = match queue
                        .claim_pending(&consumer_name, min_idle.as_millis() as u64, 5)
                        .await
                    {
                        Ok(jobs) => jobs,
                        Err(e) => {
                            warn!("Failed to claim pending jobs: {}", e);
                            continue;
                        }
                    };
                    if jobs.is_empty() {
                        continue;
                    }
                    info!("Claimed {} pending jobs", jobs.len());
                    for (message_id, job) in jobs {
                        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                            return;
                        };
                        let ctx = Arc::clone(&ctx);
                        let queue = Arc::clone(&queue);
                        tokio::spawn(async move {
                            let _permit = permit;
                            Self::execute_job(ctx, queue, message_id, job).await;
                        });
                    }
                }
            }
        }
    }

    /// Enqueue an expired-directory sweep every `interval`. Dedup keys keep
    /// a fleet of workers from queueing more than one per hour.
    async fn cleanup_schedule(
        queue: Arc<JobQueue>,
        interval: Duration,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match queue.enqueue_cleanup(CleanupJob::expired()).await {
                        Ok(message_id) => debug!("Scheduled cleanup as {}", message_id),
                        Err(QueueError::Duplicate(_)) => debug!("Cleanup already scheduled"),
                        Err(e) => warn!("Failed to schedule cleanup: {}", e),
                    }
                }
            }
        }
    }

    /// Execute a single job with retry and DLQ handling.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueJob,
    ) {
        let kind = job.kind();
        let job_id = job.job_id().to_string();
        let span = JobLogger::new(job.job_id(), kind).create_span();
        let started = Instant::now();
        info!(job_id = %job_id, kind, "Executing job");

        let result = ctx.process(&job).instrument(span).await;
        let elapsed = started.elapsed().as_secs_f64();

        let error = match result {
            Ok(()) => {
                metrics::record_job(kind, "completed", elapsed);
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
                return;
            }
            Err(e) => e,
        };

        error!(job_id = %job_id, kind, "Job failed: {}", error);

        let max_retries = queue.max_retries();
        let retry_count = if error.is_retryable() {
            queue.increment_retry(&message_id).await.unwrap_or(u32::MAX)
        } else {
            0
        };

        match failure_action(&error, retry_count, max_retries) {
            FailureAction::Retry => {
                metrics::record_job(kind, "retried", elapsed);
                info!(
                    "Job {} will be retried (attempt {}/{})",
                    job_id, retry_count, max_retries
                );
            }
            FailureAction::DeadLetter => {
                metrics::record_job(kind, "failed", elapsed);
                if let Err(e) = queue.dlq(&message_id, &job, &error.to_string()).await {
                    error!("Failed to move job {} to DLQ: {}", job_id, e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
