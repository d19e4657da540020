//! Local job directory storage.
//!
//! This crate provides:
//! - The uploads/outputs directory layout and public URLs
//! - Thumbnail publishing for cluster representatives
//! - Capture discovery with a fixed extension preference
//! - Retention-based cleanup of job directories

pub mod captures;
pub mod cleanup;
pub mod error;
pub mod layout;
pub mod thumbnails;

pub use captures::scan_captures;
pub use cleanup::{cleanup_expired, cleanup_job, CleanupStats, RetentionPolicy};
pub use error::{StorageError, StorageResult};
pub use layout::StorageLayout;
pub use thumbnails::{LocalThumbnailWriter, ThumbnailWriter};
