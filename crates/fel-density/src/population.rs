//! Population kernel: per-frame neighbor counts inside hyper-spherical radii.

use fel_comm::{allreduce_sum, triangular_partition, worker_rows, Cluster};
use fel_core::{CoordMatrix, FelError, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Rows per dynamically scheduled chunk of the outer loop.
const CHUNK_ROWS: usize = 1024;

/// Counts, for every frame and every radius, the frames within that radius.
///
/// Returns `(radius, counts)` pairs in ascending radius order with
/// `counts[i] = 1 + |{ j != i : d2(i, j) < radius^2 }|`; the count includes
/// the frame itself. Duplicate radii are collapsed. Non-positive radii are
/// allowed and yield self-only counts.
///
/// The pair loop runs over the upper triangle only, split across workers by
/// the triangular partition; both endpoints of a pair are incremented, so
/// the per-radius accumulators are atomic. Radii are visited in descending
/// order and a pair that misses one radius is outside all smaller ones.
pub fn populations(
    coords: &CoordMatrix,
    radii: &[f32],
    cluster: &Cluster,
) -> Result<Vec<(f32, Vec<usize>)>> {
    if radii.is_empty() {
        return Err(FelError::bad_argument(
            "at least one radius is required for population counting",
        ));
    }
    let n_rows = coords.n_rows();
    let mut radii_desc = radii.to_vec();
    radii_desc.sort_by(|a, b| b.total_cmp(a));
    radii_desc.dedup();
    let rad2: Vec<f32> = radii_desc.iter().map(|r| r * r).collect();

    if cluster.is_root() {
        log::info!(
            "calculating populations of {} frames for {} radii",
            n_rows,
            radii_desc.len()
        );
    }

    let counters: Vec<Vec<AtomicU32>> = radii_desc
        .iter()
        .map(|_| (0..n_rows).map(|_| AtomicU32::new(0)).collect())
        .collect();

    let partition = triangular_partition(n_rows, cluster.n_workers());
    worker_rows(&partition, cluster.rank(), n_rows)
        .into_par_iter()
        .with_min_len(CHUNK_ROWS)
        .for_each(|i| {
            for j in (i + 1)..n_rows {
                let dist2 = coords.squared_distance(i, j);
                for (k, &r2) in rad2.iter().enumerate() {
                    if dist2 < r2 {
                        counters[k][i].fetch_add(1, Ordering::Relaxed);
                        counters[k][j].fetch_add(1, Ordering::Relaxed);
                    } else {
                        // not inside the larger radius, so not inside the
                        // smaller ones either
                        break;
                    }
                }
            }
        });

    let mut result = Vec::with_capacity(radii_desc.len());
    for (k, &radius) in radii_desc.iter().enumerate() {
        let mut merged: Vec<u64> = counters[k]
            .iter()
            .map(|c| c.load(Ordering::Relaxed) as u64)
            .collect();
        allreduce_sum(cluster, &mut merged)?;
        // the frame itself counts once, added after the global reduction
        let counts: Vec<usize> = merged.iter().map(|&c| c as usize + 1).collect();
        result.push((radius, counts));
    }
    result.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(result)
}
