//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Metric names as constants for consistency.
pub mod names {
    // Jobs
    pub const JOBS_PROCESSED_TOTAL: &str = "dframe_jobs_processed_total";
    pub const JOB_DURATION_SECONDS: &str = "dframe_job_duration_seconds";

    // Analysis
    pub const FRAMES_HASHED_TOTAL: &str = "dframe_frames_hashed_total";
    pub const CLUSTERS_PER_JOB: &str = "dframe_clusters_per_job";

    // Composition
    pub const COMPOSITION_FRAMES_SKIPPED_TOTAL: &str = "dframe_composition_frames_skipped_total";

    // Collaborators
    pub const STATUS_SINK_FAILURES_TOTAL: &str = "dframe_status_sink_failures_total";
    pub const RESULT_STORE_RETRIES_TOTAL: &str = "dframe_result_store_retries_total";
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))
}

/// Record a finished job.
pub fn record_job(kind: &str, outcome: &str, duration_secs: f64) {
    let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
    counter!(names::JOBS_PROCESSED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_frames_hashed(count: usize) {
    counter!(names::FRAMES_HASHED_TOTAL).increment(count as u64);
}

pub fn record_clusters(count: usize) {
    histogram!(names::CLUSTERS_PER_JOB).record(count as f64);
}

pub fn record_frames_skipped(count: usize) {
    counter!(names::COMPOSITION_FRAMES_SKIPPED_TOTAL).increment(count as u64);
}

pub fn record_status_sink_failure(channel: &str) {
    let labels = [("channel", channel.to_string())];
    counter!(names::STATUS_SINK_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_result_store_retries(retries: u32) {
    counter!(names::RESULT_STORE_RETRIES_TOTAL).increment(retries as u64);
}
