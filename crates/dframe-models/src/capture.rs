//! User-supplied capture images, one per cluster.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Accepted capture extensions in lookup preference order.
pub const CAPTURE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// File stem used for a cluster's capture and thumbnail.
pub fn cluster_stem(cluster_id: u32) -> String {
    format!("cluster-{}", cluster_id)
}

/// Parse `cluster-{id}.{ext}` into `(id, ext)`, lowercasing the extension.
pub fn parse_capture_name(file_name: &str) -> Option<(u32, String)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    let id = stem.strip_prefix("cluster-")?.parse().ok()?;
    Some((id, ext.to_ascii_lowercase()))
}

/// Sparse `cluster_id -> image` set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSet {
    captures: BTreeMap<u32, PathBuf>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capture. Returns the previous path for the cluster, if any.
    pub fn insert(&mut self, cluster_id: u32, path: impl Into<PathBuf>) -> Option<PathBuf> {
        self.captures.insert(cluster_id, path.into())
    }

    /// Capture image for a cluster.
    pub fn get(&self, cluster_id: u32) -> Option<&Path> {
        self.captures.get(&cluster_id).map(PathBuf::as_path)
    }

    pub fn contains(&self, cluster_id: u32) -> bool {
        self.captures.contains_key(&cluster_id)
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Cluster ids that have a capture, ascending.
    pub fn cluster_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.captures.keys().copied()
    }
}

impl<P: Into<PathBuf>> FromIterator<(u32, P)> for CaptureSet {
    fn from_iter<I: IntoIterator<Item = (u32, P)>>(iter: I) -> Self {
        Self {
            captures: iter.into_iter().map(|(id, p)| (id, p.into())).collect(),
        }
    }
}
