//! Capture discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use dframe_models::capture::parse_capture_name;
use dframe_models::{CaptureSet, CAPTURE_EXTENSIONS};

use crate::error::{StorageError, StorageResult};

/// Build a capture set from `cluster-{id}.{ext}` files in `dir`.
///
/// When a cluster has several files, the extension earliest in
/// [`CAPTURE_EXTENSIONS`] wins. Files with other names or extensions are
/// ignored.
pub async fn scan_captures(dir: &Path) -> StorageResult<CaptureSet> {
    if !tokio::fs::try_exists(dir).await? {
        return Err(StorageError::not_found(format!(
            "Captures directory {}",
            dir.display()
        )));
    }

    let mut best: BTreeMap<u32, (usize, PathBuf)> = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some((cluster_id, ext)) = parse_capture_name(&name.to_string_lossy()) else {
            debug!(file = ?name, "Ignoring non-capture file");
            continue;
        };
        let Some(rank) = CAPTURE_EXTENSIONS.iter().position(|e| *e == ext) else {
            warn!(file = ?name, "Ignoring capture with unsupported extension");
            continue;
        };
        let replace = best.get(&cluster_id).map_or(true, |(r, _)| rank < *r);
        if replace {
            best.insert(cluster_id, (rank, entry.path()));
        }
    }

    Ok(best
        .into_iter()
        .map(|(cluster_id, (_, path))| (cluster_id, path))
        .collect())
}
