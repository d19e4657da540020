//! Worker configuration.

use std::time::Duration;

use dframe_analysis::{ClusterConfig, GapPolicy, HasherConfig};
use dframe_media::ExtractionConfig;
use dframe_models::encoding::DEFAULT_FPS;
use dframe_queue::RESULT_TTL_SECS;
use dframe_storage::{RetentionPolicy, StorageLayout};

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Hard time limit for one job
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker scans for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed
    pub claim_min_idle: Duration,
    /// How often an expired-directory sweep is enqueued
    pub cleanup_interval: Duration,
    /// Bound on each status write and on Redis round trips
    pub status_timeout: Duration,
    /// Port for the Prometheus exporter; disabled when unset
    pub metrics_port: Option<u16>,
    /// Lifetime of stored analysis results
    pub result_ttl_secs: u64,
    /// Output frame rate for composed videos
    pub output_fps: f64,
    /// Handling of frame indices missing from a mapping
    pub gap_policy: GapPolicy,
    pub hasher: HasherConfig,
    pub clustering: ClusterConfig,
    pub extraction: ExtractionConfig,
    pub layout: StorageLayout,
    pub retention: RetentionPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(3600),
            status_timeout: Duration::from_secs(2),
            metrics_port: None,
            result_ttl_secs: RESULT_TTL_SECS,
            output_fps: DEFAULT_FPS,
            gap_policy: GapPolicy::default(),
            hasher: HasherConfig::default(),
            clustering: ClusterConfig::default(),
            extraction: ExtractionConfig::default(),
            layout: StorageLayout::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: env_parse("WORKER_JOB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            cleanup_interval: env_parse("CLEANUP_INTERVAL_SECS")
                .filter(|&s: &u64| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            status_timeout: env_parse("STATUS_TIMEOUT_MS")
                .filter(|&ms: &u64| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.status_timeout),
            metrics_port: env_parse("METRICS_PORT"),
            result_ttl_secs: env_parse("RESULT_TTL_SECS")
                .filter(|&s: &u64| s > 0)
                .unwrap_or(defaults.result_ttl_secs),
            output_fps: env_parse("OUTPUT_FPS")
                .filter(|f: &f64| f.is_finite() && *f > 0.0)
                .unwrap_or(defaults.output_fps),
            gap_policy: env_parse("COMPOSITION_GAP_POLICY").unwrap_or(defaults.gap_policy),
            hasher: HasherConfig::from_env(),
            clustering: ClusterConfig::from_env(),
            extraction: ExtractionConfig::from_env(),
            layout: StorageLayout::from_env(),
            retention: RetentionPolicy::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert_eq!(config.output_fps, 24.0);
        assert_eq!(config.gap_policy, GapPolicy::Skip);
        assert_eq!(config.clustering.hamming_threshold, 6);
        assert_eq!(config.hasher.hash_size, 8);
        assert!(config.metrics_port.is_none());
        assert_eq!(config.result_ttl_secs, 86400);
        assert_eq!(config.status_timeout, Duration::from_secs(2));
    }
}
