//! Shared data models for the DanceFrame backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and status updates
//! - Analysis results and the frame-to-cluster mapping
//! - User capture sets
//! - Encoding configuration

pub mod analysis;
pub mod capture;
pub mod encoding;
pub mod job;
pub mod job_status;

// Re-export common types
pub use analysis::{AnalysisResult, ClusterInfo, FrameMapping, MappingError};
pub use capture::{CaptureSet, CAPTURE_EXTENSIONS};
pub use encoding::EncodingConfig;
pub use job::JobId;
pub use job_status::{JobStatus, StatusChannel, StatusUpdate};
