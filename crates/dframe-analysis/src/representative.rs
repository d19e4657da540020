//! Representative frame selection.

use crate::cluster::Clustering;
use crate::frames::Frame;

/// The canonical frame of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representative<'a> {
    pub cluster_id: u32,
    pub frame: &'a Frame,
    pub size: u32,
}

/// One entry per cluster, ordered by cluster id.
///
/// The representative is the cluster's first member, which is also the
/// member with the smallest frame index.
pub fn select_representatives(clustering: &Clustering) -> Vec<Representative<'_>> {
    clustering
        .clusters
        .iter()
        .filter_map(|cluster| {
            let frame = clustering.frames.get(cluster.representative() as usize)?;
            Some(Representative {
                cluster_id: cluster.id,
                frame,
                size: cluster.size() as u32,
            })
        })
        .collect()
}
