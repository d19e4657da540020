//! Frame clustering core.
//!
//! This crate provides:
//! - DCT perceptual hashing of frame images
//! - Greedy single-pass clustering by Hamming distance
//! - Representative selection per cluster
//! - Expansion of a frame mapping back into a per-frame capture sequence

pub mod cluster;
pub mod error;
pub mod expand;
pub mod frames;
pub mod hash;
pub mod hasher;
pub mod representative;

pub use cluster::{Cluster, ClusterConfig, Clustering, FrameClusterer, DEFAULT_HAMMING_THRESHOLD};
pub use error::{AnalysisError, AnalysisResult};
pub use expand::{expand, ExpansionEntry, ExpansionPlan, ExpansionWarning, GapPolicy};
pub use frames::{has_uniform_name_width, order_frames, Frame, HashedFrame};
pub use hash::PerceptualHash;
pub use hasher::{HasherConfig, PerceptualHasher, DEFAULT_HASH_SIZE};
pub use representative::{select_representatives, Representative};
