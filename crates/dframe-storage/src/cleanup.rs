//! Retention cleanup of job directories.
//!
//! Each job owns `uploads/{job}` and `outputs/{job}`. Directories whose
//! modification time is older than the retention window are removed.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use dframe_models::JobId;

use crate::error::StorageResult;
use crate::layout::StorageLayout;

/// Default retention window in hours.
pub const DEFAULT_RETENTION_HOURS: u64 = 24;

/// How long job directories are kept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub retention: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(DEFAULT_RETENTION_HOURS * 3600),
        }
    }
}

impl RetentionPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let hours = std::env::var("FILE_RETENTION_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETENTION_HOURS);
        Self {
            retention: Duration::from_secs(hours * 3600),
        }
    }
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub uploads_removed: u32,
    pub outputs_removed: u32,
    pub errors: u32,
    pub bytes_freed: u64,
}

impl CleanupStats {
    pub fn total_removed(&self) -> u32 {
        self.uploads_removed + self.outputs_removed
    }
}

/// Remove job directories older than the retention window.
pub async fn cleanup_expired(layout: &StorageLayout, policy: RetentionPolicy) -> StorageResult<CleanupStats> {
    let layout = layout.clone();
    let now = SystemTime::now();
    let stats = tokio::task::spawn_blocking(move || {
        let cutoff = now.checked_sub(policy.retention).unwrap_or(SystemTime::UNIX_EPOCH);
        info!(
            cutoff = %DateTime::<Utc>::from(cutoff).to_rfc3339(),
            "Cleaning up expired job directories"
        );
        let mut stats = CleanupStats::default();
        let uploads_removed = sweep_root(&layout.uploads_root, cutoff, &mut stats);
        let outputs_removed = sweep_root(&layout.outputs_root, cutoff, &mut stats);
        CleanupStats {
            uploads_removed,
            outputs_removed,
            ..stats
        }
    })
    .await?;

    info!(
        uploads_removed = stats.uploads_removed,
        outputs_removed = stats.outputs_removed,
        errors = stats.errors,
        bytes_freed = stats.bytes_freed,
        "Cleanup finished"
    );
    Ok(stats)
}

/// Remove both directories of one job immediately.
pub async fn cleanup_job(layout: &StorageLayout, job_id: &JobId) -> StorageResult<CleanupStats> {
    let upload = layout.upload_dir(job_id)?;
    let output = layout.output_dir(job_id)?;
    let stats = tokio::task::spawn_blocking(move || {
        let mut stats = CleanupStats::default();
        if remove_tracked(&upload, &mut stats) {
            stats.uploads_removed += 1;
        }
        if remove_tracked(&output, &mut stats) {
            stats.outputs_removed += 1;
        }
        stats
    })
    .await?;

    info!(job_id = %job_id, removed = stats.total_removed(), "Cleaned up job files");
    Ok(stats)
}

fn sweep_root(root: &Path, cutoff: SystemTime, stats: &mut CleanupStats) -> u32 {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(root = %root.display(), "Cannot list directory: {}", e);
            stats.errors += 1;
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| {
            if m.is_dir() {
                m.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path.display(), "Cannot stat entry: {}", e);
                stats.errors += 1;
                continue;
            }
        };
        if modified < cutoff && remove_tracked(&path, stats) {
            removed += 1;
        }
    }
    removed
}

/// Remove a directory tree, counting its bytes. Returns whether it was removed.
fn remove_tracked(path: &Path, stats: &mut CleanupStats) -> bool {
    if !path.exists() {
        return false;
    }
    let size = dir_size(path);
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), bytes = size, "Removed directory");
            stats.bytes_freed += size;
            true
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to remove directory: {}", e);
            stats.errors += 1;
            false
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(_) => entry.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> StorageLayout {
        StorageLayout::new(dir.path().join("uploads"), dir.path().join("outputs"))
    }

    fn make_job(layout: &StorageLayout, id: &str) {
        let job = JobId::from(id);
        let frames = layout.frames_dir(&job).unwrap();
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::write(frames.join("frame_0001.jpg"), vec![0u8; 100]).unwrap();
        let out = layout.output_dir(&job).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("final.mp4"), vec![0u8; 50]).unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_job() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        make_job(&layout, "a");
        make_job(&layout, "b");

        let stats = cleanup_job(&layout, &JobId::from("a")).await.unwrap();
        assert_eq!(stats.uploads_removed, 1);
        assert_eq!(stats.outputs_removed, 1);
        assert_eq!(stats.bytes_freed, 150);
        assert!(!layout.upload_dir(&JobId::from("a")).unwrap().exists());
        assert!(layout.upload_dir(&JobId::from("b")).unwrap().exists());

        let again = cleanup_job(&layout, &JobId::from("a")).await.unwrap();
        assert_eq!(again, CleanupStats::default());
    }

    #[tokio::test]
    async fn test_zero_retention_removes_everything() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        make_job(&layout, "a");
        make_job(&layout, "b");
        std::thread::sleep(Duration::from_millis(20));

        let policy = RetentionPolicy {
            retention: Duration::ZERO,
        };
        let stats = cleanup_expired(&layout, policy).await.unwrap();
        assert_eq!(stats.uploads_removed, 2);
        assert_eq!(stats.outputs_removed, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.bytes_freed, 300);
    }

    #[tokio::test]
    async fn test_recent_directories_are_kept() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        make_job(&layout, "fresh");

        let stats = cleanup_expired(&layout, RetentionPolicy::default()).await.unwrap();
        assert_eq!(stats.total_removed(), 0);
        assert!(layout.upload_dir(&JobId::from("fresh")).unwrap().exists());
    }

    #[tokio::test]
    async fn test_missing_roots_are_not_errors() {
        let dir = TempDir::new().unwrap();
        let stats = cleanup_expired(&layout(&dir), RetentionPolicy::default()).await.unwrap();
        assert_eq!(stats, CleanupStats::default());
    }
}
