//! Thumbnail publishing for cluster representatives.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use dframe_models::JobId;

use crate::error::{StorageError, StorageResult};
use crate::layout::StorageLayout;

/// Publishes a representative frame and returns its public reference.
#[async_trait]
pub trait ThumbnailWriter: Send + Sync {
    async fn write(&self, job_id: &JobId, cluster_id: u32, source: &Path) -> StorageResult<String>;
}

/// Copies thumbnails into the job's output directory.
#[derive(Debug, Clone)]
pub struct LocalThumbnailWriter {
    layout: StorageLayout,
}

impl LocalThumbnailWriter {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl ThumbnailWriter for LocalThumbnailWriter {
    async fn write(&self, job_id: &JobId, cluster_id: u32, source: &Path) -> StorageResult<String> {
        if !tokio::fs::try_exists(source).await? {
            return Err(StorageError::not_found(source.display().to_string()));
        }
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_else(|| "jpg".to_string());

        let dest = self.layout.thumbnail_path(job_id, cluster_id, &ext)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &dest).await?;

        debug!(cluster_id, dest = %dest.display(), "Wrote thumbnail");
        Ok(self.layout.thumbnail_url(job_id, cluster_id, &ext))
    }
}
