//! Job directory layout.
//!
//! ```text
//! uploads/{job}/original.mp4|original.gif
//! uploads/{job}/frames/frame_NNNN.jpg
//! uploads/{job}/captures/cluster-{id}.png|jpg|jpeg
//! uploads/{job}/sequence/frame_NNNN.png
//! outputs/{job}/thumbnails/cluster-{id}.jpg
//! outputs/{job}/final.mp4
//! ```

use std::path::PathBuf;

use dframe_models::capture::cluster_stem;
use dframe_models::JobId;

use crate::error::{StorageError, StorageResult};

/// Original upload names in lookup order.
pub const ORIGINAL_VIDEO_NAMES: [&str; 2] = ["original.mp4", "original.gif"];
pub const FINAL_VIDEO_NAME: &str = "final.mp4";

/// Filesystem roots and the public URL prefix for outputs.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Root for uploaded sources and intermediate files
    pub uploads_root: PathBuf,
    /// Root for published artifacts
    pub outputs_root: PathBuf,
    /// URL prefix under which `outputs_root` is served
    pub public_prefix: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            uploads_root: PathBuf::from("uploads"),
            outputs_root: PathBuf::from("outputs"),
            public_prefix: "/outputs".to_string(),
        }
    }
}

impl StorageLayout {
    pub fn new(uploads_root: impl Into<PathBuf>, outputs_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            outputs_root: outputs_root.into(),
            ..Default::default()
        }
    }

    /// Create layout from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uploads_root: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_root),
            outputs_root: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.outputs_root),
            public_prefix: std::env::var("OUTPUT_URL_PREFIX")
                .unwrap_or(defaults.public_prefix),
        }
    }

    fn checked(job_id: &JobId) -> StorageResult<&str> {
        if job_id.is_path_safe() {
            Ok(job_id.as_str())
        } else {
            Err(StorageError::invalid_key(job_id.as_str()))
        }
    }

    pub fn upload_dir(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.uploads_root.join(Self::checked(job_id)?))
    }

    pub fn output_dir(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.outputs_root.join(Self::checked(job_id)?))
    }

    pub fn frames_dir(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.upload_dir(job_id)?.join("frames"))
    }

    pub fn captures_dir(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.upload_dir(job_id)?.join("captures"))
    }

    /// Scratch directory for the expanded image sequence.
    pub fn sequence_dir(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.upload_dir(job_id)?.join("sequence"))
    }

    pub fn thumbnails_dir(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.output_dir(job_id)?.join("thumbnails"))
    }

    pub fn thumbnail_path(&self, job_id: &JobId, cluster_id: u32, ext: &str) -> StorageResult<PathBuf> {
        Ok(self
            .thumbnails_dir(job_id)?
            .join(format!("{}.{}", cluster_stem(cluster_id), ext)))
    }

    pub fn final_video_path(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.output_dir(job_id)?.join(FINAL_VIDEO_NAME))
    }

    /// Public URL for a path relative to a job's output directory.
    pub fn output_url(&self, job_id: &JobId, relative: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_prefix.trim_end_matches('/'),
            job_id,
            relative.trim_start_matches('/')
        )
    }

    pub fn thumbnail_url(&self, job_id: &JobId, cluster_id: u32, ext: &str) -> String {
        self.output_url(
            job_id,
            &format!("thumbnails/{}.{}", cluster_stem(cluster_id), ext),
        )
    }

    pub fn final_video_url(&self, job_id: &JobId) -> String {
        self.output_url(job_id, FINAL_VIDEO_NAME)
    }

    /// Locate the uploaded source video, preferring MP4 over GIF.
    pub async fn find_original(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        let dir = self.upload_dir(job_id)?;
        for name in ORIGINAL_VIDEO_NAMES {
            let candidate = dir.join(name);
            if tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(StorageError::not_found(format!(
            "Original video for job {}",
            job_id
        )))
    }

    /// Make sure both roots exist.
    pub async fn ensure_roots(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.uploads_root).await?;
        tokio::fs::create_dir_all(&self.outputs_root).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_and_urls() {
        let layout = StorageLayout::new("/data/uploads", "/data/outputs");
        let job = JobId::from("abc-123");

        assert_eq!(
            layout.frames_dir(&job).unwrap(),
            PathBuf::from("/data/uploads/abc-123/frames")
        );
        assert_eq!(
            layout.thumbnail_path(&job, 4, "jpg").unwrap(),
            PathBuf::from("/data/outputs/abc-123/thumbnails/cluster-4.jpg")
        );
        assert_eq!(
            layout.thumbnail_url(&job, 4, "jpg"),
            "/outputs/abc-123/thumbnails/cluster-4.jpg"
        );
        assert_eq!(layout.final_video_url(&job), "/outputs/abc-123/final.mp4");
    }

    #[test]
    fn test_rejects_unsafe_job_ids() {
        let layout = StorageLayout::default();
        assert!(matches!(
            layout.upload_dir(&JobId::from("../etc")),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(layout.final_video_path(&JobId::from("")).is_err());
    }

    #[test]
    fn test_prefix_trailing_slash() {
        let layout = StorageLayout {
            public_prefix: "https://cdn.example.com/outputs/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            layout.final_video_url(&JobId::from("j")),
            "https://cdn.example.com/outputs/j/final.mp4"
        );
    }

    #[tokio::test]
    async fn test_find_original_prefers_mp4() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().join("uploads"), dir.path().join("outputs"));
        let job = JobId::from("job1");
        let upload = layout.upload_dir(&job).unwrap();
        std::fs::create_dir_all(&upload).unwrap();

        assert!(matches!(
            layout.find_original(&job).await,
            Err(StorageError::NotFound(_))
        ));

        std::fs::write(upload.join("original.gif"), b"gif").unwrap();
        assert_eq!(layout.find_original(&job).await.unwrap(), upload.join("original.gif"));

        std::fs::write(upload.join("original.mp4"), b"mp4").unwrap();
        assert_eq!(layout.find_original(&job).await.unwrap(), upload.join("original.mp4"));
    }
}
