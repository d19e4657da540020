//! Analysis results: clusters and the frame-to-cluster mapping.
//!
//! The mapping is the artifact that links analysis to composition. It is
//! logically `frame_index -> cluster_id`, but JSON stringifies object keys,
//! so the deserializer accepts both `"3": 1` and `3: 1` and treats them as
//! the same entry.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors raised while building or reading a mapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Invalid frame index key: {0}")]
    InvalidKey(String),

    #[error("Conflicting entries for frame {index}: clusters {first} and {second}")]
    Conflict { index: u32, first: u32, second: u32 },
}

/// Summary of one cluster exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterInfo {
    /// Cluster id, assigned in creation order starting at 0
    pub id: u32,
    /// Number of frames in the cluster
    pub size: u32,
    /// Public reference to the representative frame's thumbnail
    pub thumbnail_url: String,
}

/// Dense `frame_index -> cluster_id` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct FrameMapping(BTreeMap<u32, u32>);

impl FrameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the cluster for a frame.
    ///
    /// Re-inserting the same pair is a no-op; a different cluster for an
    /// existing frame is a conflict.
    pub fn insert(&mut self, frame_index: u32, cluster_id: u32) -> Result<(), MappingError> {
        match self.0.get(&frame_index) {
            Some(&existing) if existing != cluster_id => Err(MappingError::Conflict {
                index: frame_index,
                first: existing,
                second: cluster_id,
            }),
            _ => {
                self.0.insert(frame_index, cluster_id);
                Ok(())
            }
        }
    }

    /// Cluster id for an integer frame index.
    pub fn get(&self, frame_index: u32) -> Option<u32> {
        self.0.get(&frame_index).copied()
    }

    /// Cluster id for a frame index given in its serialized string form.
    ///
    /// The key is normalized to an integer before the lookup, so `"7"`,
    /// `" 7 "` and `"007"` all find frame 7.
    pub fn lookup(&self, key: &str) -> Result<Option<u32>, MappingError> {
        let index = parse_index(key)?;
        Ok(self.get(index))
    }

    /// Largest frame index present.
    pub fn max_index(&self) -> Option<u32> {
        self.0.keys().next_back().copied()
    }

    /// Whether every index in `0..=max_index` is present.
    pub fn is_dense(&self) -> bool {
        match self.max_index() {
            Some(max) => self.0.len() as u64 == max as u64 + 1,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(frame_index, cluster_id)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.0.iter().map(|(&k, &v)| (k, v))
    }
}

impl FromIterator<(u32, u32)> for FrameMapping {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn parse_index(key: &str) -> Result<u32, MappingError> {
    key.trim()
        .parse::<u32>()
        .map_err(|_| MappingError::InvalidKey(key.to_string()))
}

/// Map key or value that may arrive as an integer or a numeric string.
struct Index(u32);

impl<'de> Deserialize<'de> for Index {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = Index;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or numeric string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Index, E> {
                u32::try_from(v)
                    .map(Index)
                    .map_err(|_| E::custom(format!("index out of range: {}", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Index, E> {
                u32::try_from(v)
                    .map(Index)
                    .map_err(|_| E::custom(format!("index out of range: {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Index, E> {
                parse_index(v).map(Index).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IndexVisitor)
    }
}

impl<'de> Deserialize<'de> for FrameMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = FrameMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of frame index to cluster id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FrameMapping, A::Error> {
                let mut mapping = FrameMapping::new();
                while let Some((Index(frame), Index(cluster))) = access.next_entry()? {
                    mapping.insert(frame, cluster).map_err(de::Error::custom)?;
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Output of a completed analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// Clusters ordered by id
    pub clusters: Vec<ClusterInfo>,
    /// Dense frame index to cluster id table
    pub frame_mapping: FrameMapping,
}

impl AnalysisResult {
    /// Total number of frames covered by the mapping.
    pub fn total_frames(&self) -> usize {
        self.frame_mapping.len()
    }

    /// Check that cluster ids are `0..n`, sizes add up to the frame count,
    /// and every mapped cluster exists.
    pub fn validate(&self) -> Result<(), String> {
        for (position, cluster) in self.clusters.iter().enumerate() {
            if cluster.id as usize != position {
                return Err(format!(
                    "cluster at position {} has id {}",
                    position, cluster.id
                ));
            }
        }
        let total: u64 = self.clusters.iter().map(|c| c.size as u64).sum();
        if total != self.frame_mapping.len() as u64 {
            return Err(format!(
                "cluster sizes sum to {} but mapping has {} frames",
                total,
                self.frame_mapping.len()
            ));
        }
        if let Some((frame, cluster)) = self
            .frame_mapping
            .iter()
            .find(|&(_, c)| c as usize >= self.clusters.len())
        {
            return Err(format!("frame {} maps to unknown cluster {}", frame, cluster));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_serializes_with_string_keys() {
        let mapping: FrameMapping = [(0, 0), (1, 0), (2, 1)].into_iter().collect();
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"0":0,"1":0,"2":1}"#);
    }

    #[test]
    fn test_mapping_round_trip_through_string_keys() {
        let mapping: FrameMapping = (0..50).map(|i| (i, i % 7)).collect();
        let json = serde_json::to_value(&mapping).unwrap();
        let back: FrameMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, mapping);
        for i in 0..50 {
            assert_eq!(back.get(i), Some(i % 7));
            assert_eq!(back.lookup(&i.to_string()).unwrap(), Some(i % 7));
        }
    }

    #[test]
    fn test_mapping_accepts_string_values() {
        let back: FrameMapping = serde_json::from_str(r#"{"0":"2","1":3}"#).unwrap();
        assert_eq!(back.get(0), Some(2));
        assert_eq!(back.get(1), Some(3));
    }

    #[test]
    fn test_mapping_rejects_garbage_keys() {
        assert!(serde_json::from_str::<FrameMapping>(r#"{"a":1}"#).is_err());
        assert!(serde_json::from_str::<FrameMapping>(r#"{"-1":1}"#).is_err());
        assert!(serde_json::from_str::<FrameMapping>(r#"{"0":-4}"#).is_err());
    }

    #[test]
    fn test_mapping_rejects_conflicting_equivalent_keys() {
        let err = serde_json::from_str::<FrameMapping>(r#"{"1":1,"01":2}"#);
        assert!(err.is_err());
        let ok: FrameMapping = serde_json::from_str(r#"{"1":1,"01":1}"#).unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_lookup_normalizes_key() {
        let mapping: FrameMapping = [(7, 3)].into_iter().collect();
        assert_eq!(mapping.lookup("7").unwrap(), Some(3));
        assert_eq!(mapping.lookup(" 7 ").unwrap(), Some(3));
        assert_eq!(mapping.lookup("007").unwrap(), Some(3));
        assert_eq!(mapping.lookup("8").unwrap(), None);
        assert!(mapping.lookup("seven").is_err());
    }

    #[test]
    fn test_density() {
        let dense: FrameMapping = [(0, 0), (1, 0), (2, 1)].into_iter().collect();
        assert!(dense.is_dense());
        assert_eq!(dense.max_index(), Some(2));

        let sparse: FrameMapping = [(0, 0), (3, 1)].into_iter().collect();
        assert!(!sparse.is_dense());
        let far: FrameMapping = serde_json::from_str(r#"{"0":0,"4000000000":0}"#).unwrap();
        assert!(!far.is_dense());
        assert_eq!(far.len(), 2);

        assert!(FrameMapping::new().is_dense());
        assert_eq!(FrameMapping::new().max_index(), None);
    }

    #[test]
    fn test_result_validation() {
        let result = AnalysisResult {
            clusters: vec![
                ClusterInfo { id: 0, size: 2, thumbnail_url: "/t/0".into() },
                ClusterInfo { id: 1, size: 1, thumbnail_url: "/t/1".into() },
            ],
            frame_mapping: [(0, 0), (1, 0), (2, 1)].into_iter().collect(),
        };
        assert!(result.validate().is_ok());
        assert_eq!(result.total_frames(), 3);

        let mut bad = result.clone();
        bad.clusters[1].size = 5;
        assert!(bad.validate().is_err());

        let mut bad = result;
        bad.frame_mapping = [(0, 0), (1, 0), (2, 4)].into_iter().collect();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_result_json_shape() {
        let result = AnalysisResult {
            clusters: vec![ClusterInfo { id: 0, size: 1, thumbnail_url: "/t/0".into() }],
            frame_mapping: [(0, 0)].into_iter().collect(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["clusters"][0]["thumbnail_url"], "/t/0");
        assert_eq!(value["frame_mapping"]["0"], 0);
    }
}
