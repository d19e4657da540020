//! Job status hashes polled by clients.
//!
//! Analysis status lives at `job:{id}:state` with the fields `status`,
//! `progress`, `current_step` and `error`. Generation status lives at
//! `gen:{id}:state` with `status`, `progress`, `message`, `result_url` and
//! `error`. Both expire after a day.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use dframe_models::{JobId, JobStatus, StatusChannel, StatusUpdate};

use crate::connection::{connect, DEFAULT_REDIS_TIMEOUT};
use crate::error::{QueueError, QueueResult};

/// How long a status hash outlives its last update.
pub const STATUS_TTL_SECS: u64 = 86400;

/// Redis key of a job's status hash on the given channel.
pub fn status_key(job_id: &JobId, channel: StatusChannel) -> String {
    match channel {
        StatusChannel::Analysis => format!("job:{}:state", job_id),
        StatusChannel::Generation => format!("gen:{}:state", job_id),
    }
}

fn message_field(channel: StatusChannel) -> &'static str {
    match channel {
        StatusChannel::Analysis => "current_step",
        StatusChannel::Generation => "message",
    }
}

/// Hash fields written for an update.
pub(crate) fn status_fields(update: &StatusUpdate) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("status", update.status.as_str().to_string()),
        ("progress", update.progress.to_string()),
        (message_field(update.channel), update.message.clone()),
    ];
    if let Some(error) = &update.error {
        fields.push(("error", error.clone()));
    }
    if update.channel == StatusChannel::Generation {
        if let Some(url) = &update.result_url {
            fields.push(("result_url", url.clone()));
        }
    }
    fields
}

/// Rebuild an update from a stored hash.
pub(crate) fn parse_status(
    job_id: &JobId,
    channel: StatusChannel,
    hash: &HashMap<String, String>,
) -> QueueResult<StatusUpdate> {
    let status: JobStatus = hash
        .get("status")
        .ok_or_else(|| QueueError::invalid_data("status field missing"))?
        .parse()
        .map_err(QueueError::invalid_data)?;
    let progress = match hash.get("progress") {
        Some(raw) => raw
            .parse::<u8>()
            .map_err(|e| QueueError::invalid_data(format!("progress '{}': {}", raw, e)))?,
        None => 0,
    };

    Ok(StatusUpdate {
        job_id: job_id.clone(),
        channel,
        status,
        progress: progress.min(100),
        message: hash.get(message_field(channel)).cloned().unwrap_or_default(),
        error: hash.get("error").cloned(),
        result_url: hash.get("result_url").cloned(),
    })
}

/// Destination for job status updates.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, update: &StatusUpdate) -> QueueResult<()>;
}

/// Status sink writing Redis hashes.
#[derive(Clone)]
pub struct RedisStatusStore {
    client: redis::Client,
    ttl_secs: u64,
    timeout: Duration,
}

impl RedisStatusStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            ttl_secs: STATUS_TTL_SECS,
            timeout: DEFAULT_REDIS_TIMEOUT,
        })
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

    /// Read the current status, if any was published.
    pub async fn fetch(
        &self,
        job_id: &JobId,
        channel: StatusChannel,
    ) -> QueueResult<Option<StatusUpdate>> {
        let mut conn = connect(&self.client, self.timeout).await?;
        let hash: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(status_key(job_id, channel))
            .query_async(&mut conn)
            .await?;
        if hash.is_empty() {
            return Ok(None);
        }
        parse_status(job_id, channel, &hash).map(Some)
    }
}

#[async_trait]
impl StatusSink for RedisStatusStore {
    async fn publish(&self, update: &StatusUpdate) -> QueueResult<()> {
        let mut conn = connect(&self.client, self.timeout).await?;
        let key = status_key(&update.job_id, update.channel);
        let fields = status_fields(update);

        let mut pipe = redis::pipe();
        pipe.atomic();
        if update.status != JobStatus::Failed {
            // A stale error from an earlier attempt must not outlive it.
            pipe.hdel(&key, "error").ignore();
        }
        pipe.hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, self.ttl_secs as i64)
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;

        debug!(
            job_id = %update.job_id,
            channel = update.channel.as_str(),
            status = %update.status,
            progress = update.progress,
            "Published status"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::from("job-7")
    }

    #[test]
    fn keys_per_channel() {
        assert_eq!(status_key(&job(), StatusChannel::Analysis), "job:job-7:state");
        assert_eq!(status_key(&job(), StatusChannel::Generation), "gen:job-7:state");
    }

    #[test]
    fn analysis_fields_use_current_step() {
        let update = StatusUpdate::processing(job(), StatusChannel::Analysis, 30, "Hashing");
        let fields: HashMap<_, _> = status_fields(&update).into_iter().collect();
        assert_eq!(fields["status"], "processing");
        assert_eq!(fields["progress"], "30");
        assert_eq!(fields["current_step"], "Hashing");
        assert!(!fields.contains_key("message"));
        assert!(!fields.contains_key("error"));
    }

    #[test]
    fn generation_fields_carry_result_url() {
        let update = StatusUpdate::completed(job(), StatusChannel::Generation, "done")
            .with_result_url("/outputs/job-7/final.mp4");
        let fields: HashMap<_, _> = status_fields(&update).into_iter().collect();
        assert_eq!(fields["status"], "completed");
        assert_eq!(fields["progress"], "100");
        assert_eq!(fields["message"], "done");
        assert_eq!(fields["result_url"], "/outputs/job-7/final.mp4");
    }

    #[test]
    fn failed_fields_carry_error() {
        let update = StatusUpdate::failed(job(), StatusChannel::Analysis, 60, "boom");
        let fields: HashMap<_, _> = status_fields(&update).into_iter().collect();
        assert_eq!(fields["status"], "failed");
        assert_eq!(fields["progress"], "60");
        assert_eq!(fields["error"], "boom");
    }

    #[test]
    fn parse_back() {
        let update = StatusUpdate::failed(job(), StatusChannel::Generation, 20, "no audio");
        let hash: HashMap<String, String> = status_fields(&update)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = parse_status(&job(), StatusChannel::Generation, &hash).unwrap();
        assert_eq!(parsed, update);
    }

    #[test]
    fn parse_rejects_unknown_status() {
        let mut hash = HashMap::new();
        hash.insert("status".to_string(), "exploded".to_string());
        assert!(matches!(
            parse_status(&job(), StatusChannel::Analysis, &hash),
            Err(QueueError::InvalidData(_))
        ));
    }
}
