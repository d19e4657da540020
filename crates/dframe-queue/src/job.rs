//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dframe_models::JobId;

/// Job to extract, hash and cluster the frames of an uploaded video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeVideoJob {
    /// Job ID; the upload lives under this id
    pub job_id: JobId,
    /// Extraction frame rate override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_fps: Option<f64>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl AnalyzeVideoJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            extract_fps: None,
            created_at: Utc::now(),
        }
    }

    /// Set the extraction frame rate.
    pub fn with_extract_fps(mut self, fps: f64) -> Self {
        self.extract_fps = Some(fps);
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("analyze:{}", self.job_id)
    }
}

/// Job to compose a new video from user captures and a stored analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVideoJob {
    /// Job ID of the analysis whose mapping is reused
    pub job_id: JobId,
    /// Distinguishes repeated generations of the same job
    pub request_id: String,
    /// Output frame rate override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl GenerateVideoJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            request_id: Uuid::new_v4().to_string(),
            fps: None,
            created_at: Utc::now(),
        }
    }

    /// Set the output frame rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn idempotency_key(&self) -> String {
        format!("generate:{}:{}", self.job_id, self.request_id)
    }
}

/// What a cleanup job removes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CleanupScope {
    /// Every job directory older than the retention window
    Expired,
    /// One job's directories, immediately
    Job { target: JobId },
}

/// Housekeeping job for job directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupJob {
    /// Unique job ID
    pub job_id: JobId,
    #[serde(flatten)]
    pub scope: CleanupScope,
    pub created_at: DateTime<Utc>,
}

impl CleanupJob {
    /// Sweep expired directories.
    pub fn expired() -> Self {
        Self {
            job_id: JobId::new(),
            scope: CleanupScope::Expired,
            created_at: Utc::now(),
        }
    }

    /// Remove one job's directories.
    pub fn for_job(target: JobId) -> Self {
        Self {
            job_id: JobId::new(),
            scope: CleanupScope::Job { target },
            created_at: Utc::now(),
        }
    }

    /// Expired sweeps dedupe per hour; per-job cleanups per target.
    pub fn idempotency_key(&self) -> String {
        match &self.scope {
            CleanupScope::Expired => {
                format!("cleanup:expired:{}", self.created_at.format("%Y%m%d%H"))
            }
            CleanupScope::Job { target } => format!("cleanup:job:{}", target),
        }
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Analyze an uploaded video into clusters
    AnalyzeVideo(AnalyzeVideoJob),
    /// Compose a video from captures
    GenerateVideo(GenerateVideoJob),
    /// Remove job directories
    Cleanup(CleanupJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::AnalyzeVideo(j) => &j.job_id,
            QueueJob::GenerateVideo(j) => &j.job_id,
            QueueJob::Cleanup(j) => &j.job_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::AnalyzeVideo(j) => j.idempotency_key(),
            QueueJob::GenerateVideo(j) => j.idempotency_key(),
            QueueJob::Cleanup(j) => j.idempotency_key(),
        }
    }

    /// Short name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::AnalyzeVideo(_) => "analyze_video",
            QueueJob::GenerateVideo(_) => "generate_video",
            QueueJob::Cleanup(_) => "cleanup",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_job_analyze_serde_roundtrip() {
        let job = AnalyzeVideoJob::new(JobId::from("job-1")).with_extract_fps(30.0);
        let json = serde_json::to_string(&QueueJob::AnalyzeVideo(job.clone())).expect("serialize QueueJob");
        assert!(json.contains(r#""type":"analyze_video""#));

        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");
        match decoded {
            QueueJob::AnalyzeVideo(j) => {
                assert_eq!(j.job_id, job.job_id);
                assert_eq!(j.extract_fps, Some(30.0));
                assert_eq!(j.created_at, job.created_at);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn queue_job_cleanup_serde_roundtrip() {
        let job = CleanupJob::for_job(JobId::from("old-job"));
        let json = serde_json::to_string(&QueueJob::Cleanup(job.clone())).expect("serialize");
        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize");
        match decoded {
            QueueJob::Cleanup(j) => assert_eq!(j.scope, CleanupScope::Job { target: JobId::from("old-job") }),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn generate_job_without_fps_decodes() {
        let json = r#"{"type":"generate_video","job_id":"j","request_id":"r","created_at":"2024-01-01T00:00:00Z"}"#;
        let decoded: QueueJob = serde_json::from_str(json).expect("deserialize");
        match decoded {
            QueueJob::GenerateVideo(j) => assert_eq!(j.fps, None),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn idempotency_keys() {
        let job = JobId::from("abc");
        assert_eq!(AnalyzeVideoJob::new(job.clone()).idempotency_key(), "analyze:abc");

        let a = GenerateVideoJob::new(job.clone());
        let b = GenerateVideoJob::new(job.clone());
        assert_ne!(a.idempotency_key(), b.idempotency_key());

        assert_eq!(CleanupJob::for_job(job).idempotency_key(), "cleanup:job:abc");
        assert!(CleanupJob::expired().idempotency_key().starts_with("cleanup:expired:"));
    }

    #[test]
    fn kinds() {
        assert_eq!(QueueJob::Cleanup(CleanupJob::expired()).kind(), "cleanup");
        assert_eq!(
            QueueJob::GenerateVideo(GenerateVideoJob::new(JobId::from("x"))).kind(),
            "generate_video"
        );
    }
}
