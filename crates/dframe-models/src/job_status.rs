//! Job status updates reported while a job runs.
//!
//! Status is written to a sink that the client polls. Analysis and
//! generation jobs report on separate channels because the same job id is
//! reused for both.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued waiting for a worker
    #[default]
    Pending,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Which job family a status update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusChannel {
    /// Video analysis (frame clustering)
    Analysis,
    /// Video generation (composition from captures)
    Generation,
}

impl StatusChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusChannel::Analysis => "analysis",
            StatusChannel::Generation => "generation",
        }
    }
}

/// A single status report for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusUpdate {
    /// Job the update belongs to
    pub job_id: JobId,
    /// Channel the update is published on
    pub channel: StatusChannel,
    /// Current status
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable description of the current step
    pub message: String,
    /// Error description for failed jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Public URL of the produced artifact, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl StatusUpdate {
    /// Create a processing update.
    pub fn processing(
        job_id: JobId,
        channel: StatusChannel,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            channel,
            status: JobStatus::Processing,
            progress: progress.min(100),
            message: message.into(),
            error: None,
            result_url: None,
        }
    }

    /// Create a completed update at 100%.
    pub fn completed(job_id: JobId, channel: StatusChannel, message: impl Into<String>) -> Self {
        Self {
            job_id,
            channel,
            status: JobStatus::Completed,
            progress: 100,
            message: message.into(),
            error: None,
            result_url: None,
        }
    }

    /// Create a failed update. Progress is kept at the last reported value.
    pub fn failed(
        job_id: JobId,
        channel: StatusChannel,
        progress: u8,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            job_id,
            channel,
            status: JobStatus::Failed,
            progress: progress.min(100),
            message: format!("Error: {}", error),
            error: Some(error),
            result_url: None,
        }
    }

    /// Attach a result URL.
    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = Some(url.into());
        self
    }
}
