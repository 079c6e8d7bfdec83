//! High-density neighborhood kernel.
//!
//! Collects the frames within a cutoff of a target frame, restricted to a
//! prefix of the free-energy-sorted frame order. Everything here works in
//! *positions* of that sorted order, not raw frame indices; the caller maps
//! back through its permutation.

use fel_comm::{broadcast, gather, rectangular_partition, worker_rows, Cluster, Payload};
use fel_core::{CoordMatrix, FelError, Result};
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Finds all positions `j < limit` whose frame lies within `max_dist2` of
/// the frame at position `i_frame`, plus `i_frame` itself.
///
/// `sorted_fe` is the frame-index permutation in ascending free-energy
/// order; `limit` restricts the search to the densest prefix. The result is
/// identical on every worker.
pub fn high_density_neighborhood(
    coords: &CoordMatrix,
    sorted_fe: &[usize],
    i_frame: usize,
    limit: usize,
    max_dist2: f32,
    cluster: &Cluster,
) -> Result<BTreeSet<usize>> {
    let target = sorted_fe[i_frame];
    let partition = rectangular_partition(limit, cluster.n_workers());
    let local: Vec<usize> = worker_rows(&partition, cluster.rank(), limit)
        .into_par_iter()
        .filter(|&j| j != i_frame && coords.squared_distance(target, sorted_fe[j]) < max_dist2)
        .collect();

    let mut neighborhood = BTreeSet::new();
    if let Some(parts) = gather(cluster, Payload::Indices(local))? {
        for part in parts {
            let Payload::Indices(positions) = part else {
                return Err(FelError::reduction(
                    "expected position indices in neighborhood reduction",
                ));
            };
            neighborhood.extend(positions);
        }
        neighborhood.insert(i_frame);
    }
    cluster.barrier()?;
    let merged = broadcast(
        cluster,
        cluster
            .is_root()
            .then(|| Payload::Indices(neighborhood.iter().copied().collect())),
    )?;
    if !cluster.is_root() {
        let Payload::Indices(positions) = merged else {
            return Err(FelError::reduction(
                "expected position indices in neighborhood broadcast",
            ));
        };
        neighborhood = positions.into_iter().collect();
    }
    cluster.barrier()?;
    Ok(neighborhood)
}
