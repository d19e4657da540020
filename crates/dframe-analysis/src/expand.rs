//! Expansion of a frame mapping into a per-frame capture sequence.
//!
//! Every index from 0 to the mapping's largest index is resolved to a
//! cluster and then to that cluster's capture. Unresolvable indices are
//! skipped, and the surviving frames are renumbered contiguously. A run of
//! absent indices is reported once, so the work is linear in the number of
//! mapping entries rather than in the largest index.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use dframe_models::{CaptureSet, FrameMapping};

use crate::error::{AnalysisError, AnalysisResult};

/// What to do with an index in `0..=max_index` that has no mapping entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Skip the index with a warning
    #[default]
    Skip,
    /// Fail with `MissingMappingEntry`
    Fail,
}

impl FromStr for GapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(GapPolicy::Skip),
            "fail" | "strict" => Ok(GapPolicy::Fail),
            other => Err(format!("unknown gap policy: {}", other)),
        }
    }
}

/// One output frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionEntry {
    /// Contiguous position in the output sequence
    pub output_index: u32,
    /// Original frame index
    pub frame_index: u32,
    pub cluster_id: u32,
    /// Capture image used for this frame
    pub source: PathBuf,
}

/// Skipped frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionWarning {
    /// No mapping entries for `first..=last`
    MissingMappingEntries { first: u32, last: u32 },
    /// The resolved cluster has no capture
    MissingCapture { frame_index: u32, cluster_id: u32 },
}

impl ExpansionWarning {
    /// First skipped frame index.
    pub fn frame_index(&self) -> u32 {
        match self {
            ExpansionWarning::MissingMappingEntries { first, .. } => *first,
            ExpansionWarning::MissingCapture { frame_index, .. } => *frame_index,
        }
    }

    /// Number of frames this warning covers.
    pub fn frames(&self) -> usize {
        match self {
            ExpansionWarning::MissingMappingEntries { first, last } => {
                (*last as usize) - (*first as usize) + 1
            }
            ExpansionWarning::MissingCapture { .. } => 1,
        }
    }
}

/// Ordered output frames plus everything that was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionPlan {
    pub entries: Vec<ExpansionEntry>,
    pub warnings: Vec<ExpansionWarning>,
}

impl ExpansionPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames dropped from the output, counting every index of a gap.
    pub fn skipped(&self) -> usize {
        self.warnings.iter().map(ExpansionWarning::frames).sum()
    }

    /// Clusters referenced by the mapping that had no capture.
    pub fn missing_clusters(&self) -> BTreeSet<u32> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                ExpansionWarning::MissingCapture { cluster_id, .. } => Some(*cluster_id),
                _ => None,
            })
            .collect()
    }

    /// Distinct captures referenced by the output.
    pub fn used_clusters(&self) -> BTreeSet<u32> {
        self.entries.iter().map(|e| e.cluster_id).collect()
    }
}

/// Build the output sequence for a mapping and capture set.
///
/// Fails with `EmptyMapping` for an empty mapping and `NoCaptures` when
/// nothing survives. Under [`GapPolicy::Fail`] a missing index is an error.
pub fn expand(
    mapping: &FrameMapping,
    captures: &CaptureSet,
    policy: GapPolicy,
) -> AnalysisResult<ExpansionPlan> {
    if mapping.is_empty() {
        return Err(AnalysisError::EmptyMapping);
    }

    let mut plan = ExpansionPlan::default();
    let mut next_expected: u32 = 0;
    for (frame_index, cluster_id) in mapping.iter() {
        if frame_index > next_expected {
            if policy == GapPolicy::Fail {
                return Err(AnalysisError::MissingMappingEntry(next_expected));
            }
            let (first, last) = (next_expected, frame_index - 1);
            warn!(first, last, "No mapping entries for frames, skipping");
            plan.warnings
                .push(ExpansionWarning::MissingMappingEntries { first, last });
        }
        next_expected = frame_index.saturating_add(1);

        match captures.get(cluster_id) {
            Some(source) => {
                let output_index = plan.entries.len() as u32;
                plan.entries.push(ExpansionEntry {
                    output_index,
                    frame_index,
                    cluster_id,
                    source: source.to_path_buf(),
                });
            }
            None => {
                plan.warnings.push(ExpansionWarning::MissingCapture {
                    frame_index,
                    cluster_id,
                });
            }
        }
    }

    let missing = plan.missing_clusters();
    if !missing.is_empty() {
        warn!(
            clusters = ?missing,
            skipped = plan.skipped(),
            "Missing captures for clusters, frames skipped"
        );
    }

    if plan.is_empty() {
        return Err(AnalysisError::NoCaptures);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_frame_mapping() -> FrameMapping {
        // Clusters cycle 0, 1, 2 over ten frames.
        (0..10).map(|i| (i, i % 3)).collect()
    }

    #[test]
    fn test_full_capture_set() {
        let captures: CaptureSet = [(0, "c0.png"), (1, "c1.png"), (2, "c2.png")]
            .into_iter()
            .collect();
        let plan = expand(&ten_frame_mapping(), &captures, GapPolicy::Skip).unwrap();
        assert_eq!(plan.len(), 10);
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.entries[4].source, PathBuf::from("c1.png"));
        assert_eq!(plan.used_clusters(), BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_partial_captures_keep_order() {
        let captures: CaptureSet = [(0, "c0.png"), (2, "c2.jpg")].into_iter().collect();
        let plan = expand(&ten_frame_mapping(), &captures, GapPolicy::Skip).unwrap();

        let frames: Vec<_> = plan.entries.iter().map(|e| e.frame_index).collect();
        assert_eq!(frames, vec![0, 2, 3, 5, 6, 8, 9]);
        let outputs: Vec<_> = plan.entries.iter().map(|e| e.output_index).collect();
        assert_eq!(outputs, (0..7).collect::<Vec<_>>());
        assert!(plan.entries.iter().all(|e| e.cluster_id == 0 || e.cluster_id == 2));
        assert_eq!(plan.skipped(), 3);
        assert_eq!(plan.missing_clusters(), BTreeSet::from([1]));
    }

    #[test]
    fn test_no_captures_is_error() {
        let result = expand(&ten_frame_mapping(), &CaptureSet::new(), GapPolicy::Skip);
        assert!(matches!(result, Err(AnalysisError::NoCaptures)));
    }

    #[test]
    fn test_empty_mapping_is_error() {
        let captures: CaptureSet = [(0, "c0.png")].into_iter().collect();
        let result = expand(&FrameMapping::new(), &captures, GapPolicy::Skip);
        assert!(matches!(result, Err(AnalysisError::EmptyMapping)));
    }

    #[test]
    fn test_gap_skipped_by_default() {
        let mapping: FrameMapping = [(0, 0), (1, 0), (3, 0)].into_iter().collect();
        let captures: CaptureSet = [(0, "c0.png")].into_iter().collect();
        let plan = expand(&mapping, &captures, GapPolicy::default()).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.warnings,
            vec![ExpansionWarning::MissingMappingEntries { first: 2, last: 2 }]
        );
        assert_eq!(plan.skipped(), 1);
        assert_eq!(plan.entries[2].frame_index, 3);
        assert_eq!(plan.entries[2].output_index, 2);
    }

    #[test]
    fn test_gap_fails_under_strict_policy() {
        let mapping: FrameMapping = [(0, 0), (2, 0)].into_iter().collect();
        let captures: CaptureSet = [(0, "c0.png")].into_iter().collect();
        let err = expand(&mapping, &captures, GapPolicy::Fail).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingMappingEntry(1)));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_sparse_stored_mapping_reports_one_gap() {
        let mapping: FrameMapping =
            serde_json::from_str(r#"{"0":0,"50000000":0,"50000002":"0"}"#).unwrap();
        let captures: CaptureSet = [(0, "c0.png")].into_iter().collect();

        let plan = expand(&mapping, &captures, GapPolicy::Skip).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.warnings,
            vec![
                ExpansionWarning::MissingMappingEntries { first: 1, last: 49_999_999 },
                ExpansionWarning::MissingMappingEntries { first: 50_000_001, last: 50_000_001 },
            ]
        );
        assert_eq!(plan.skipped(), 50_000_000);
        assert_eq!(plan.entries[1].frame_index, 50_000_000);
        assert_eq!(plan.entries[2].output_index, 2);

        let err = expand(&mapping, &captures, GapPolicy::Fail).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingMappingEntry(1)));
    }

    #[test]
    fn test_gap_then_missing_capture_counts_frames() {
        let mapping: FrameMapping = [(0, 0), (5, 1), (6, 0)].into_iter().collect();
        let captures: CaptureSet = [(0, "c0.png")].into_iter().collect();
        let plan = expand(&mapping, &captures, GapPolicy::Skip).unwrap();

        assert_eq!(plan.len(), 2);
        // Four absent indices and one frame of cluster 1.
        assert_eq!(plan.skipped(), 5);
        assert_eq!(plan.warnings[0].frame_index(), 1);
        assert_eq!(plan.missing_clusters(), BTreeSet::from([1]));
    }

    #[test]
    fn test_string_keyed_mapping_expands_identically() {
        let mapping = ten_frame_mapping();
        let json = serde_json::to_string(&mapping).unwrap();
        let restored: FrameMapping = serde_json::from_str(&json).unwrap();
        let padded: FrameMapping = serde_json::from_str(
            r#"{"00":"0","01":1,"02":2,"03":0,"04":"1","05":2,"06":0,"07":1,"08":"2","09":0}"#,
        )
        .unwrap();

        let captures: CaptureSet = [(0, "c0.png"), (2, "c2.png")].into_iter().collect();
        let a = expand(&mapping, &captures, GapPolicy::Skip).unwrap();
        let b = expand(&restored, &captures, GapPolicy::Skip).unwrap();
        let c = expand(&padded, &captures, GapPolicy::Skip).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_gap_policy_parsing() {
        assert_eq!("skip".parse::<GapPolicy>().unwrap(), GapPolicy::Skip);
        assert_eq!("FAIL".parse::<GapPolicy>().unwrap(), GapPolicy::Fail);
        assert!("maybe".parse::<GapPolicy>().is_err());
    }
}
