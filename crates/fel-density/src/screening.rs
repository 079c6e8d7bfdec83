//! Initial density clustering and low-density frame assignment.
//!
//! Screening walks the frames in ascending free-energy order. Every
//! unassigned frame below the threshold pulls in its high-density
//! neighborhood; neighborhoods that touch existing clusters merge them under
//! the smallest id, otherwise they open a new cluster. Cluster ids are
//! 1-based and 0 marks an unassigned frame.

use crate::hd_neighborhood::high_density_neighborhood;
use fel_comm::Cluster;
use fel_core::{CoordMatrix, Neighborhood, Result};
use std::collections::BTreeSet;

/// Mean squared nearest-neighbor distance, ignoring sentinel records.
///
/// Used as the length scale of the screening neighborhoods.
pub fn mean_neighbor_dist2(nh: &Neighborhood) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for n in nh {
        if n.dist2.is_finite() {
            sum += n.dist2 as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

fn ascending_fe_order(free_energy: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..free_energy.len()).collect();
    order.sort_by(|&a, &b| free_energy[a].total_cmp(&free_energy[b]));
    order
}

/// Builds the initial clustering of the frames below `threshold`.
///
/// Frames at or above the threshold stay at 0. Every worker returns the
/// same assignment; the neighborhood queries inside synchronize the group.
pub fn initial_density_clustering(
    coords: &CoordMatrix,
    free_energy: &[f32],
    nh: &Neighborhood,
    threshold: f32,
    cluster: &Cluster,
) -> Result<Vec<usize>> {
    let n_rows = coords.n_rows();
    let order = ascending_fe_order(free_energy);
    let limit = order
        .iter()
        .take_while(|&&frame| free_energy[frame] < threshold)
        .count();
    let sigma2 = mean_neighbor_dist2(nh);
    let max_dist2 = 4.0 * sigma2;
    if cluster.is_root() {
        log::info!(
            "screening {} of {} frames below free energy {:.3} (sigma2 = {:.4})",
            limit,
            n_rows,
            threshold,
            sigma2
        );
    }

    let mut clustering = vec![0usize; n_rows];
    let mut next_id = 0usize;
    for pos in 0..limit {
        if clustering[order[pos]] != 0 {
            continue;
        }
        let neighborhood =
            high_density_neighborhood(coords, &order, pos, limit, max_dist2, cluster)?;
        let touched: BTreeSet<usize> = neighborhood
            .iter()
            .map(|&p| clustering[order[p]])
            .filter(|&id| id != 0)
            .collect();
        let target = match touched.iter().next() {
            Some(&smallest) => smallest,
            None => {
                next_id += 1;
                next_id
            }
        };
        if touched.len() > 1 {
            // the neighborhood bridges several clusters: merge them
            for id in clustering.iter_mut() {
                if *id != 0 && touched.contains(id) {
                    *id = target;
                }
            }
        }
        for &p in &neighborhood {
            clustering[order[p]] = target;
        }
    }
    if cluster.is_root() {
        let n_clusters = clustering
            .iter()
            .filter(|&&id| id != 0)
            .collect::<BTreeSet<_>>()
            .len();
        log::info!("initial clustering found {} clusters", n_clusters);
    }
    Ok(clustering)
}

/// Assigns every unclustered frame to the cluster of its nearest
/// lower-free-energy neighbor.
///
/// Frames are processed in ascending free-energy order, so the neighbor has
/// been assigned by the time a frame is visited. Frames whose neighbor is
/// the sentinel stay at 0.
pub fn assign_low_density_frames(
    clustering: &[usize],
    nh_hd: &Neighborhood,
    free_energy: &[f32],
) -> Vec<usize> {
    let mut assigned = clustering.to_vec();
    for frame in ascending_fe_order(free_energy) {
        if assigned[frame] == 0 {
            let neighbor = nh_hd[frame];
            if neighbor.is_real(assigned.len()) {
                assigned[frame] = assigned[neighbor.index];
            }
        }
    }
    assigned
}
