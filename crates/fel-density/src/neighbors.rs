//! Nearest-neighbor kernel.
//!
//! For every frame, find the closest other frame and the closest frame with
//! lower free energy. The row partition is rectangular because each frame
//! scans all others either way.

use fel_comm::{broadcast, gather, rectangular_partition, worker_rows, Cluster, Payload};
use fel_core::{CoordMatrix, FelError, Neighbor, NeighborRow, Neighborhood, Result};
use rayon::prelude::*;

/// Rows per dynamically scheduled chunk.
const CHUNK_ROWS: usize = 2048;

/// Computes the nearest-neighbor and nearest-lower-free-energy-neighbor
/// assignments for all frames.
///
/// Distance ties keep the first frame encountered, so the lower index wins.
/// A frame with no lower-free-energy neighbor keeps the sentinel record in
/// the second neighborhood; that is a valid result, not an error.
pub fn nearest_neighbors(
    coords: &CoordMatrix,
    free_energy: &[f32],
    cluster: &Cluster,
) -> Result<(Neighborhood, Neighborhood)> {
    let n_rows = coords.n_rows();
    if free_energy.len() != n_rows {
        return Err(FelError::bad_argument(format!(
            "nearest-neighbor search needs one free energy per frame ({} frames, {} energies)",
            n_rows,
            free_energy.len()
        )));
    }
    if cluster.is_root() {
        log::info!("calculating nearest neighbors of {} frames", n_rows);
    }

    let partition = rectangular_partition(n_rows, cluster.n_workers());
    let local: Vec<NeighborRow> = worker_rows(&partition, cluster.rank(), n_rows)
        .into_par_iter()
        .with_min_len(CHUNK_ROWS)
        .map(|i| {
            let mut nh = Neighbor::none(n_rows);
            let mut nh_hd = Neighbor::none(n_rows);
            for j in 0..n_rows {
                if i == j {
                    continue;
                }
                let dist2 = coords.squared_distance(i, j);
                if dist2 < nh.dist2 {
                    nh = Neighbor { index: j, dist2 };
                }
                if free_energy[j] < free_energy[i] && dist2 < nh_hd.dist2 {
                    nh_hd = Neighbor { index: j, dist2 };
                }
            }
            NeighborRow {
                frame: i,
                nh,
                nh_hd,
            }
        })
        .collect();

    // gather the partial slabs at the root, then broadcast the merged pair
    let mut nh: Neighborhood = vec![Neighbor::none(n_rows); n_rows];
    let mut nh_hd: Neighborhood = vec![Neighbor::none(n_rows); n_rows];
    if let Some(parts) = gather(cluster, Payload::NeighborRows(local))? {
        for part in parts {
            let Payload::NeighborRows(rows) = part else {
                return Err(FelError::reduction(
                    "expected neighbor rows in nearest-neighbor reduction",
                ));
            };
            for row in rows {
                nh[row.frame] = row.nh;
                nh_hd[row.frame] = row.nh_hd;
            }
        }
    }
    cluster.barrier()?;
    let merged = broadcast(
        cluster,
        cluster.is_root().then(|| {
            Payload::NeighborRows(
                (0..n_rows)
                    .map(|frame| NeighborRow {
                        frame,
                        nh: nh[frame],
                        nh_hd: nh_hd[frame],
                    })
                    .collect(),
            )
        }),
    )?;
    if !cluster.is_root() {
        let Payload::NeighborRows(rows) = merged else {
            return Err(FelError::reduction(
                "expected neighbor rows in nearest-neighbor broadcast",
            ));
        };
        for row in rows {
            nh[row.frame] = row.nh;
            nh_hd[row.frame] = row.nh_hd;
        }
    }
    cluster.barrier()?;
    Ok((nh, nh_hd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fel_comm::LocalCluster;

    fn compute(
        coords: &CoordMatrix,
        free_energy: &[f32],
        n_workers: usize,
    ) -> (Neighborhood, Neighborhood) {
        let mut results = LocalCluster::run(n_workers, |cluster| {
            nearest_neighbors(coords, free_energy, cluster)
        })
        .unwrap();
        results.pop().unwrap()
    }

    #[test]
    fn test_three_frames_with_free_energies() {
        let coords = CoordMatrix::new(vec![0.0, 0.5, 3.0], 3, 1);
        let free_energy = [1.0, 0.0, 2.0];
        let (nh, nh_hd) = compute(&coords, &free_energy, 1);
        assert_eq!(nh[0], Neighbor { index: 1, dist2: 0.25 });
        assert_eq!(nh[1], Neighbor { index: 0, dist2: 0.25 });
        assert_eq!(nh[2], Neighbor { index: 1, dist2: 6.25 });
        // frame 1 has the lowest free energy and keeps the sentinel
        assert_eq!(nh_hd[0], Neighbor { index: 1, dist2: 0.25 });
        assert!(!nh_hd[1].is_real(3));
        assert!(nh_hd[1].dist2.is_infinite());
        assert_eq!(nh_hd[2], Neighbor { index: 1, dist2: 6.25 });
    }

    #[test]
    fn test_high_density_neighbor_is_denser() {
        let coords = CoordMatrix::new(vec![0.0, 1.0, 2.5, 2.6, 7.0], 5, 1);
        let free_energy = [0.5, 0.1, 0.9, 0.2, 1.5];
        let (_, nh_hd) = compute(&coords, &free_energy, 1);
        for (i, hd) in nh_hd.iter().enumerate() {
            if hd.is_real(5) {
                assert!(free_energy[hd.index] < free_energy[i]);
            }
        }
    }

    #[test]
    fn test_mutual_neighbors_share_the_minimum_distance() {
        let coords = CoordMatrix::new(vec![0.0, 0.5, 3.0, 3.2], 4, 1);
        let free_energy = [0.0; 4];
        let (nh, _) = compute(&coords, &free_energy, 1);
        // frames 2 and 3 are mutual nearest neighbors
        assert_eq!(nh[2].index, 3);
        assert_eq!(nh[3].index, 2);
        assert_eq!(nh[2].dist2, nh[3].dist2);
    }

    #[test]
    fn test_distance_tie_keeps_lower_index() {
        // frames 0 and 2 are equidistant from frame 1
        let coords = CoordMatrix::new(vec![0.0, 1.0, 2.0], 3, 1);
        let free_energy = [0.0; 3];
        let (nh, _) = compute(&coords, &free_energy, 1);
        assert_eq!(nh[1].index, 0);
    }

    #[test]
    fn test_results_identical_across_worker_counts() {
        let coords = CoordMatrix::new(vec![0.0, 1.0, 2.5, 2.6, 7.0, 6.9], 6, 1);
        let free_energy = [0.5, 0.1, 0.9, 0.2, 1.5, 0.05];
        let reference = compute(&coords, &free_energy, 1);
        for n_workers in [2usize, 3] {
            let results = LocalCluster::run(n_workers, |cluster| {
                nearest_neighbors(&coords, &free_energy, cluster)
            })
            .unwrap();
            for pair in results {
                assert_eq!(pair, reference, "n_workers={n_workers}");
            }
        }
    }
}
