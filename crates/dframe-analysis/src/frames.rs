//! Ordered frame sequences.

use std::path::{Path, PathBuf};

use crate::hash::PerceptualHash;

/// An extracted frame image.
///
/// `index` is the frame's position after sorting by file name. Extractors
/// write fixed-width zero-padded names so this matches the numeric order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u32,
    pub name: String,
    pub path: PathBuf,
}

impl Frame {
    pub fn new(index: u32, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_name(&path);
        Self { index, name, path }
    }
}

/// A frame paired with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFrame {
    pub frame: Frame,
    pub hash: PerceptualHash,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Sort frame paths lexicographically by file name and assign indices.
///
/// Ties on file name (same name in different directories) fall back to the
/// full path so the order stays total.
pub fn order_frames<I, P>(paths: I) -> Vec<Frame>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut named: Vec<(String, PathBuf)> = paths
        .into_iter()
        .map(Into::into)
        .map(|p| (file_name(&p), p))
        .collect();
    named.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    named
        .into_iter()
        .enumerate()
        .map(|(i, (name, path))| Frame {
            index: i as u32,
            name,
            path,
        })
        .collect()
}

/// Whether all names have the same length, which is what makes
/// lexicographic order agree with numeric order for padded sequence names.
pub fn has_uniform_name_width(frames: &[Frame]) -> bool {
    frames
        .first()
        .map(|first| frames.iter().all(|f| f.name.len() == first.name.len()))
        .unwrap_or(true)
}
