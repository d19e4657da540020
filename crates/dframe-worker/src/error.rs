//! Worker error types.

use thiserror::Error;

use dframe_analysis::AnalysisError;
use dframe_media::MediaError;
use dframe_queue::QueueError;
use dframe_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Bad or missing input: no video, zero frames, unreadable image
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Input larger than the configured limits
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// A durable collaborator could not be reached
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Upstream contract broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    pub fn dependency_unavailable(msg: impl Into<String>) -> Self {
        Self::DependencyUnavailable(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// Whether the error comes from a bounded-resource check.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            WorkerError::ResourceLimit(_) | WorkerError::Media(MediaError::ResourceLimit(_))
        )
    }

    /// Whether the error means an upstream contract was broken.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            WorkerError::InvariantViolation(_) => true,
            WorkerError::Analysis(e) => e.is_invariant_violation(),
            _ => false,
        }
    }

    /// Check if this is a permanent failure that should NOT be retried.
    ///
    /// Re-running the job on the same input gives the same answer.
    pub fn is_permanent_failure(&self) -> bool {
        if self.is_resource_limit() || self.is_invariant_violation() {
            return true;
        }
        match self {
            WorkerError::InvalidInput(_) => true,
            WorkerError::Analysis(e) => !matches!(e, AnalysisError::ThreadPool(_)),
            WorkerError::Media(e) => e.is_input_error(),
            WorkerError::Storage(e) => {
                matches!(e, StorageError::NotFound(_) | StorageError::InvalidKey(_))
            }
            _ => false,
        }
    }

    /// Check if error is retryable at the queue level.
    pub fn is_retryable(&self) -> bool {
        if self.is_permanent_failure() {
            return false;
        }
        match self {
            WorkerError::DependencyUnavailable(_)
            | WorkerError::Timeout(_)
            | WorkerError::Io(_)
            | WorkerError::Queue(_) => true,
            WorkerError::Storage(e) => matches!(e, StorageError::Io(_) | StorageError::Task(_)),
            WorkerError::Media(e) => matches!(
                e,
                MediaError::Timeout(_) | MediaError::Io(_) | MediaError::FfmpegFailed { .. }
            ),
            WorkerError::Analysis(AnalysisError::ThreadPool(_)) => true,
            _ => false,
        }
    }

    /// Human-readable text written to the status sink.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::ResourceLimit(msg) | WorkerError::Media(MediaError::ResourceLimit(msg)) => {
                format!("Video exceeds limits: {}. Please trim the video and try again.", msg)
            }
            WorkerError::InvalidInput(msg) => msg.clone(),
            WorkerError::Analysis(AnalysisError::NoCaptures) => {
                "No captures matched any frame. Please upload at least one capture.".to_string()
            }
            WorkerError::Analysis(e @ AnalysisError::Decode { .. }) => e.to_string(),
            WorkerError::Media(MediaError::InvalidVideo(msg)) => format!("Invalid video: {}", msg),
            WorkerError::Media(MediaError::FileNotFound(path)) => {
                format!("File not found: {}", path.display())
            }
            other => other.to_string(),
        }
    }
}
