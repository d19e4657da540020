//! Cleanup job handling.

use dframe_queue::{CleanupJob, CleanupScope};
use dframe_storage::{cleanup_expired, cleanup_job, CleanupStats, RetentionPolicy, StorageLayout};

use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Run a cleanup job against the local job directories.
pub async fn run_cleanup(
    layout: &StorageLayout,
    retention: RetentionPolicy,
    job: &CleanupJob,
) -> WorkerResult<CleanupStats> {
    let logger = JobLogger::new(&job.job_id, "cleanup");
    let stats = match &job.scope {
        CleanupScope::Expired => {
            logger.log_start("expired job directories");
            cleanup_expired(layout, retention).await?
        }
        CleanupScope::Job { target } => {
            logger.log_start(&format!("directories of job {}", target));
            cleanup_job(layout, target).await?
        }
    };

    if stats.errors > 0 {
        logger.log_warning(&format!("{} entries could not be removed", stats.errors));
    }
    logger.log_completion(&format!(
        "removed {} directories, freed {} bytes",
        stats.total_removed(),
        stats.bytes_freed
    ));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dframe_models::JobId;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_job_scope_removes_only_target() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path().join("uploads"), tmp.path().join("outputs"));
        let target = JobId::from("old");
        let other = JobId::from("keep");
        for job in [&target, &other] {
            std::fs::create_dir_all(layout.frames_dir(job).unwrap()).unwrap();
        }

        let stats = run_cleanup(&layout, RetentionPolicy::default(), &CleanupJob::for_job(target.clone()))
            .await
            .unwrap();

        assert_eq!(stats.uploads_removed, 1);
        assert!(!layout.upload_dir(&target).unwrap().exists());
        assert!(layout.upload_dir(&other).unwrap().exists());
    }

    #[tokio::test]
    async fn test_expired_scope_uses_retention() {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path().join("uploads"), tmp.path().join("outputs"));
        std::fs::create_dir_all(layout.output_dir(&JobId::from("a")).unwrap()).unwrap();

        let keep = RetentionPolicy {
            retention: Duration::from_secs(3600),
        };
        let stats = run_cleanup(&layout, keep, &CleanupJob::expired()).await.unwrap();
        assert_eq!(stats.total_removed(), 0);

        std::thread::sleep(Duration::from_millis(20));
        let purge = RetentionPolicy {
            retention: Duration::ZERO,
        };
        let stats = run_cleanup(&layout, purge, &CleanupJob::expired()).await.unwrap();
        assert_eq!(stats.outputs_removed, 1);
    }
}
