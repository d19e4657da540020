//! Best-effort status reporting for a running job.
//!
//! Progress never moves backwards within a run, and a failure keeps the
//! last value reached. Sink errors and slow sinks are logged and swallowed.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use dframe_models::{JobId, StatusChannel, StatusUpdate};
use dframe_queue::StatusSink;

use crate::metrics;

/// Longest a single status write may take before it is dropped.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ProgressReporter {
    sink: Arc<dyn StatusSink>,
    job_id: JobId,
    channel: StatusChannel,
    last: AtomicU8,
    publish_timeout: Duration,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn StatusSink>, job_id: JobId, channel: StatusChannel) -> Self {
        Self {
            sink,
            job_id,
            channel,
            last: AtomicU8::new(0),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Highest progress reported so far.
    pub fn last_progress(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    /// Report a processing milestone. Lower values than the last one are
    /// raised to it.
    pub async fn step(&self, progress: u8, message: impl Into<String>) {
        let progress = progress.min(100);
        let previous = self.last.fetch_max(progress, Ordering::SeqCst);
        let update = StatusUpdate::processing(
            self.job_id.clone(),
            self.channel,
            progress.max(previous),
            message,
        );
        self.publish(update).await;
    }

    /// Report successful completion at 100%.
    pub async fn complete(&self, message: impl Into<String>, result_url: Option<String>) {
        self.last.store(100, Ordering::SeqCst);
        let mut update = StatusUpdate::completed(self.job_id.clone(), self.channel, message);
        if let Some(url) = result_url {
            update = update.with_result_url(url);
        }
        self.publish(update).await;
    }

    /// Report a terminal failure at the last reached progress.
    pub async fn fail(&self, error: impl Into<String>) {
        let update = StatusUpdate::failed(
            self.job_id.clone(),
            self.channel,
            self.last_progress(),
            error,
        );
        self.publish(update).await;
    }

    async fn publish(&self, update: StatusUpdate) {
        let error = match tokio::time::timeout(self.publish_timeout, self.sink.publish(&update)).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.publish_timeout.as_millis()),
        };
        metrics::record_status_sink_failure(self.channel.as_str());
        warn!(
            job_id = %self.job_id,
            channel = self.channel.as_str(),
            status = %update.status,
            "Failed to publish status: {}", error
        );
    }
}
