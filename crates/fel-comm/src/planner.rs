//! Work partitioning across the worker group.
//!
//! The all-pairs distance kernels run a nested loop of the form
//!
//! ```text
//! for i in idx[w]..idx[w+1] {
//!     for j in i+1..n_rows { ... }
//! }
//! ```
//!
//! so outer rows near 0 carry long inner loops and rows near `n_rows` carry
//! short ones. The triangular partition balances the pair count per worker
//! through triangular sums; the rectangular partition is for kernels whose
//! inner loop always runs over all rows.

use std::ops::Range;

/// Triangular number `n * (n + 1) / 2`.
#[inline]
fn triangular(n: usize) -> usize {
    n * (n + 1) / 2
}

/// Splits the upper-triangular index space of `n_rows` rows evenly across
/// `n_workers` workers.
///
/// Returns the outer-loop start row per worker; worker `w` handles rows
/// `[idx[w], idx[w+1])` and the last worker runs to `n_rows`. Boundaries are
/// solved backwards from the last worker: the pair count of rows `[a, n)` is
/// `T(n - a)`, so each boundary satisfies `k = sqrt(2 * (T(prev) + W))` for
/// the per-worker workload `W = T(n_rows) / n_workers`.
///
/// The result is nondecreasing and the summed pair work over all workers is
/// exactly `n_rows * (n_rows - 1) / 2`.
pub fn triangular_partition(n_rows: usize, n_workers: usize) -> Vec<usize> {
    assert!(n_workers > 0, "need at least one worker");
    let workload = triangular(n_rows) / n_workers;
    let mut indices = vec![0usize; n_workers];
    let mut last = 0usize;
    for w in (1..n_workers).rev() {
        last = (2.0 * (triangular(last) + workload) as f64).sqrt() as usize;
        indices[w] = n_rows.saturating_sub(last);
    }
    indices
}

/// Splits `n` rows into equal slabs; the last worker takes the remainder.
pub fn rectangular_partition(n: usize, n_workers: usize) -> Vec<usize> {
    assert!(n_workers > 0, "need at least one worker");
    let per_worker = n / n_workers;
    (0..n_workers).map(|w| w * per_worker).collect()
}

/// Resolves a worker's row range from a partition's start indices.
pub fn worker_rows(indices: &[usize], rank: usize, n_rows: usize) -> Range<usize> {
    let from = indices[rank];
    let to = if rank + 1 == indices.len() {
        n_rows
    } else {
        indices[rank + 1]
    };
    from..to
}

/// Number of `(i, j)` pairs with `i < j` whose outer index lies in `rows`.
pub fn pair_work(rows: &Range<usize>, n_rows: usize) -> usize {
    rows.clone().map(|i| n_rows - 1 - i).sum()
}
