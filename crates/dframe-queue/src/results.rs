//! Analysis result storage.
//!
//! The result of an analysis job is the only state a later generation job
//! needs, so it is kept as JSON under `job:{id}:result` until it expires.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

use dframe_models::{AnalysisResult, JobId};

use crate::connection::{connect, DEFAULT_REDIS_TIMEOUT};
use crate::error::{QueueError, QueueResult};

/// Default lifetime of a stored analysis result.
pub const RESULT_TTL_SECS: u64 = 86400;

pub fn result_key(job_id: &JobId) -> String {
    format!("job:{}:result", job_id)
}

/// Durable store for analysis results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a result, replacing any previous one.
    async fn store(&self, job_id: &JobId, result: &AnalysisResult) -> QueueResult<()>;

    /// Load a result. `None` when it was never stored or has expired.
    async fn load(&self, job_id: &JobId) -> QueueResult<Option<AnalysisResult>>;
}

/// Result store backed by Redis string keys with a TTL.
#[derive(Clone)]
pub struct RedisResultStore {
    client: redis::Client,
    ttl_secs: u64,
    timeout: Duration,
}

impl RedisResultStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            ttl_secs: RESULT_TTL_SECS,
            timeout: DEFAULT_REDIS_TIMEOUT,
        })
    }

    /// Create from `REDIS_URL` and `RESULT_TTL_SECS`.
    pub fn from_env() -> QueueResult<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let ttl = std::env::var("RESULT_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&t: &u64| t > 0)
            .unwrap_or(RESULT_TTL_SECS);
        Ok(Self::new(&url)?.with_ttl(ttl))
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Connect and response timeout for every command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Check that Redis answers.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = connect(&self.client, self.timeout)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn store(&self, job_id: &JobId, result: &AnalysisResult) -> QueueResult<()> {
        let payload = serde_json::to_string(result)?;
        let mut conn = connect(&self.client, self.timeout).await?;
        conn.set_ex::<_, _, ()>(result_key(job_id), &payload, self.ttl_secs)
            .await?;
        info!(
            job_id = %job_id,
            clusters = result.clusters.len(),
            frames = result.total_frames(),
            "Stored analysis result"
        );
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> QueueResult<Option<AnalysisResult>> {
        let mut conn = connect(&self.client, self.timeout).await?;
        let payload: Option<String> = conn.get(result_key(job_id)).await?;
        let Some(payload) = payload else {
            debug!(job_id = %job_id, "No stored analysis result");
            return Ok(None);
        };
        let result: AnalysisResult = serde_json::from_str(&payload)?;
        result.validate().map_err(QueueError::invalid_data)?;
        Ok(Some(result))
    }
}
