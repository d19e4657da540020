//! Greedy single-pass frame clustering.
//!
//! Frames are visited in sorted order. Each frame joins the existing cluster
//! whose representative hash is nearest, provided the distance is within the
//! threshold; otherwise it starts a new cluster and becomes its
//! representative. Ties go to the earliest cluster. Clusters are never merged
//! or revisited, so the output depends only on the input order and the
//! threshold.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dframe_models::FrameMapping;

use crate::error::{AnalysisError, AnalysisResult};
use crate::frames::{Frame, HashedFrame};
use crate::hash::PerceptualHash;

/// Default maximum Hamming distance for two frames to share a cluster.
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 6;

/// Clustering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Maximum Hamming distance to a representative to join its cluster
    pub hamming_threshold: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: DEFAULT_HAMMING_THRESHOLD,
        }
    }
}

impl ClusterConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            hamming_threshold: std::env::var("HASH_HAMMING_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HAMMING_THRESHOLD),
        }
    }
}

/// A group of visually similar frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Creation-order id starting at 0
    pub id: u32,
    /// Frame indices in the order they joined; the first is the representative
    pub members: Vec<u32>,
    /// Hash of the representative frame
    pub representative_hash: PerceptualHash,
}

impl Cluster {
    /// Index of the representative frame.
    pub fn representative(&self) -> u32 {
        self.members[0]
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Output of a clustering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clustering {
    /// Clusters ordered by id
    pub clusters: Vec<Cluster>,
    /// Dense frame index to cluster id table
    pub mapping: FrameMapping,
    /// Frames in processing order; `frames[i].index == i`
    pub frames: Vec<Frame>,
}

impl Clustering {
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn frame_count(&self) -> usize {
        self.mapping.len()
    }
}

/// Groups hashed frames by Hamming distance.
#[derive(Debug, Clone, Copy)]
pub struct FrameClusterer {
    threshold: u32,
}

impl FrameClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            threshold: config.hamming_threshold,
        }
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Sort frames by file name, then cluster them in that order.
    ///
    /// Each frame's index is reassigned to its sorted position. Zero frames
    /// yields an empty clustering.
    pub fn cluster(&self, mut frames: Vec<HashedFrame>) -> AnalysisResult<Clustering> {
        frames.sort_by(|a, b| {
            a.frame
                .name
                .cmp(&b.frame.name)
                .then_with(|| a.frame.path.cmp(&b.frame.path))
        });

        let hashes: Vec<PerceptualHash> = frames.iter().map(|f| f.hash.clone()).collect();
        let (clusters, mapping) = self.cluster_hashes(&hashes)?;

        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, hf)| Frame {
                index: i as u32,
                ..hf.frame
            })
            .collect();

        Ok(Clustering {
            clusters,
            mapping,
            frames,
        })
    }

    /// Cluster hashes already in processing order; position is frame index.
    pub fn cluster_hashes(
        &self,
        hashes: &[PerceptualHash],
    ) -> AnalysisResult<(Vec<Cluster>, FrameMapping)> {
        let Some(first) = hashes.first() else {
            return Ok((Vec::new(), FrameMapping::new()));
        };
        let bits = first.bit_len();
        if let Some((index, hash)) = hashes
            .iter()
            .enumerate()
            .find(|(_, h)| h.bit_len() != bits)
        {
            return Err(AnalysisError::HashSizeMismatch {
                index,
                expected: bits,
                actual: hash.bit_len(),
            });
        }

        let mut clusters: Vec<Cluster> = Vec::new();
        let mut assignments: Vec<u32> = Vec::with_capacity(hashes.len());

        for (i, hash) in hashes.iter().enumerate() {
            let frame_index = i as u32;

            let mut nearest: Option<(usize, u32)> = None;
            for (cluster_index, cluster) in clusters.iter().enumerate() {
                let distance = hash.distance_unchecked(&cluster.representative_hash);
                if nearest.map_or(true, |(_, best)| distance < best) {
                    nearest = Some((cluster_index, distance));
                    if distance == 0 {
                        break;
                    }
                }
            }

            let cluster_id = match nearest {
                Some((cluster_index, distance)) if distance <= self.threshold => {
                    clusters[cluster_index].members.push(frame_index);
                    cluster_index as u32
                }
                _ => {
                    let id = clusters.len() as u32;
                    clusters.push(Cluster {
                        id,
                        members: vec![frame_index],
                        representative_hash: hash.clone(),
                    });
                    id
                }
            };
            assignments.push(cluster_id);
        }

        let mapping: FrameMapping = assignments
            .into_iter()
            .enumerate()
            .map(|(i, cluster_id)| (i as u32, cluster_id))
            .collect();

        debug!(
            frames = hashes.len(),
            clusters = clusters.len(),
            threshold = self.threshold,
            "Clustered frames"
        );

        Ok((clusters, mapping))
    }
}

impl Default for FrameClusterer {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}
