//! Analysis error types.

use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors raised by hashing, clustering and expansion.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// One or more frames could not be decoded. Names the first failing
    /// frame in sorted order.
    #[error("Failed to decode frame {frame} ({failed} of {total} frames unreadable): {message}")]
    Decode {
        frame: String,
        message: String,
        failed: usize,
        total: usize,
    },

    #[error("Hash size mismatch at frame {index}: expected {expected} bits, got {actual}")]
    HashSizeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid hash size {0}: must be between {min} and {max}", min = crate::hasher::MIN_HASH_SIZE, max = crate::hasher::MAX_HASH_SIZE)]
    InvalidHashSize(u32),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("No frame mapping entry for frame {0}")]
    MissingMappingEntry(u32),

    #[error("Frame mapping is empty")]
    EmptyMapping,

    #[error("No captures matched any frame in the mapping")]
    NoCaptures,

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl AnalysisError {
    pub fn invalid_hash(msg: impl Into<String>) -> Self {
        Self::InvalidHash(msg.into())
    }

    /// Whether the error indicates a broken upstream contract rather than
    /// bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            AnalysisError::HashSizeMismatch { .. } | AnalysisError::MissingMappingEntry(_)
        )
    }
}

impl From<rayon::ThreadPoolBuildError> for AnalysisError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e.to_string())
    }
}
