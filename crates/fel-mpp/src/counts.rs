//! Transition-count matrices and their normalizations.

use fel_core::{FelError, Result, SparseMatrix};
use std::collections::{BTreeMap, BTreeSet};

fn max_state(trajectory: &[usize]) -> usize {
    trajectory.iter().copied().max().unwrap_or(0)
}

/// Counts lagged transitions of a microstate trajectory.
///
/// Entry `(from, to)` counts the windows `trajectory[i] -> trajectory[i+lag]`.
/// `concat_limits` holds the cutpoints of concatenated sub-trajectories;
/// windows crossing a cutpoint are not counted. A cursor tracks the next
/// cutpoint: a window counts iff it ends before the cutpoint, and the cursor
/// advances once the window start has reached it.
///
/// `i_max == 0` sizes the matrix from the largest state id in the
/// trajectory.
pub fn transition_counts(
    trajectory: &[usize],
    concat_limits: &[usize],
    lag: usize,
    i_max: usize,
) -> Result<SparseMatrix> {
    if lag == 0 {
        return Err(FelError::bad_argument(
            "a lagtime of 0 does not make sense for transition counting",
        ));
    }
    let i_max = if i_max == 0 { max_state(trajectory) } else { i_max };
    let mut counts = SparseMatrix::new(i_max + 1);
    if trajectory.len() <= lag {
        return Ok(counts);
    }
    let mut cursor = concat_limits.iter().peekable();
    for i in 0..trajectory.len() - lag {
        match cursor.peek() {
            Some(&&limit) => {
                if i + lag < limit {
                    counts.add(trajectory[i], trajectory[i + lag], 1.0);
                } else if i + 1 == limit {
                    cursor.next();
                }
            }
            None => {
                // last sub-trajectory, or a single continuous one
                counts.add(trajectory[i], trajectory[i + lag], 1.0);
            }
        }
    }
    Ok(counts)
}

/// Counts transitions per sub-trajectory chunk, weighting every chunk's
/// contribution to a row by the square root of its row count.
///
/// Chunks are the slices between consecutive cutpoints (plus the tail after
/// the last one). Per chunk: a plain count matrix, row weights
/// `w_i = sqrt(sum_j counts[i][j])`, and an accumulation of `w_i * counts`;
/// at the end every row is divided by its accumulated weight. Rows that
/// never saw a transition stay zero.
pub fn weighted_transition_counts(
    trajectory: &[usize],
    concat_limits: &[usize],
    lag: usize,
) -> Result<SparseMatrix> {
    if lag == 0 {
        return Err(FelError::bad_argument(
            "a lagtime of 0 does not make sense for transition counting",
        ));
    }
    let i_max = max_state(trajectory);
    let n = i_max + 1;
    let mut weighted = SparseMatrix::new(n);
    if trajectory.is_empty() {
        return Ok(weighted);
    }
    let mut acc_weights = vec![0.0f32; n];

    let mut bounds: Vec<usize> = concat_limits.to_vec();
    if bounds.last() != Some(&trajectory.len()) {
        bounds.push(trajectory.len());
    }
    let mut start = 0usize;
    for &end in &bounds {
        if end <= start || end > trajectory.len() {
            return Err(FelError::bad_argument(format!(
                "concat limits must be strictly increasing within the trajectory \
                 (offending cutpoint: {end})"
            )));
        }
        let chunk_counts = transition_counts(&trajectory[start..end], &[], lag, i_max)?;
        for i in 0..n {
            let weight = chunk_counts.row_sum(i).sqrt();
            if weight > 0.0 {
                acc_weights[i] += weight;
                for (j, c) in chunk_counts.row(i) {
                    weighted.add(i, j, weight * c);
                }
            }
        }
        start = end;
    }
    for (i, &weight) in acc_weights.iter().enumerate() {
        if weight > 0.0 {
            weighted.scale_row(i, 1.0 / weight);
        }
    }
    Ok(weighted)
}

/// Divides every named row by its row sum; zero-sum rows stay zero.
pub fn row_normalized_transition_probabilities(
    counts: &SparseMatrix,
    names: &BTreeSet<usize>,
) -> SparseMatrix {
    let mut probs = SparseMatrix::new(counts.size());
    for &i in names {
        let row_sum = counts.row_sum(i);
        if row_sum > 0.0 {
            for (j, c) in counts.row(i) {
                probs.set(i, j, c / row_sum);
            }
        }
    }
    probs
}

/// Lumps a transition matrix onto the macrostates named by `sinks`.
///
/// Macrostates are the distinct sink ids; entry `(a, b)` is the plain sum of
/// `probs[k][l]` over member microstates `k` of `a` and `l` of `b`. The
/// result is deliberately *not* renormalized; its rows carry the combined
/// probability mass of their members and callers wanting a stochastic
/// matrix must renormalize.
pub fn updated_transition_probabilities(
    probs: &SparseMatrix,
    sinks: &BTreeMap<usize, usize>,
) -> SparseMatrix {
    let mut members: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (&from, &to) in sinks {
        members.entry(to).or_default().insert(from);
    }
    let mut lumped = SparseMatrix::new(probs.size());
    for (&a, members_a) in &members {
        for (&b, members_b) in &members {
            let mut sum = 0.0f32;
            for &k in members_a {
                for &l in members_b {
                    sum += probs.get(k, l);
                }
            }
            if sum != 0.0 {
                lumped.set(a, b, sum);
            }
        }
    }
    lumped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_of(trajectory: &[usize]) -> BTreeSet<usize> {
        trajectory.iter().copied().collect()
    }

    #[test]
    fn test_counts_without_boundaries() {
        let counts = transition_counts(&[1, 1, 2, 2, 1], &[], 1, 0).unwrap();
        assert_eq!(counts.get(1, 1), 1.0);
        assert_eq!(counts.get(1, 2), 1.0);
        assert_eq!(counts.get(2, 2), 1.0);
        assert_eq!(counts.get(2, 1), 1.0);
        assert_eq!(counts.nnz(), 4);
    }

    #[test]
    fn test_boundary_suppresses_crossing_window() {
        let counts = transition_counts(&[1, 1, 2, 2, 1], &[2], 1, 0).unwrap();
        // the 1 -> 2 window spans the cutpoint at 2 and is dropped; the
        // second sub-trajectory still counts its interior transitions
        assert_eq!(counts.get(1, 1), 1.0);
        assert_eq!(counts.get(1, 2), 0.0);
        assert_eq!(counts.get(2, 2), 1.0);
        assert_eq!(counts.get(2, 1), 1.0);
    }

    #[test]
    fn test_no_window_spans_a_boundary_at_larger_lag() {
        let trajectory = [1usize, 2, 3, 4, 5, 6];
        let counts = transition_counts(&trajectory, &[3], 2, 0).unwrap();
        // windows 1->3 (0..2) and 4->6 (3..5) survive; 2->4 and 3->5 cross
        assert_eq!(counts.get(1, 3), 1.0);
        assert_eq!(counts.get(4, 6), 1.0);
        assert_eq!(counts.nnz(), 2);
    }

    #[test]
    fn test_lag_zero_is_an_error() {
        let err = transition_counts(&[1, 2], &[], 0, 0).unwrap_err();
        assert!(matches!(err, FelError::BadArgument(_)));
        let err = weighted_transition_counts(&[1, 2], &[], 0).unwrap_err();
        assert!(matches!(err, FelError::BadArgument(_)));
    }

    #[test]
    fn test_trajectory_shorter_than_lag_counts_nothing() {
        let counts = transition_counts(&[1, 2], &[], 5, 0).unwrap();
        assert_eq!(counts.nnz(), 0);
    }

    #[test]
    fn test_explicit_matrix_size() {
        let counts = transition_counts(&[1, 2, 1], &[], 1, 9).unwrap();
        assert_eq!(counts.size(), 10);
        assert_eq!(counts.get(1, 2), 1.0);
    }

    #[test]
    fn test_weighted_counts_single_chunk_reduce_to_plain_counts() {
        // with one chunk the weight cancels: w * counts / w
        let trajectory = [1usize, 1, 1, 2, 1];
        let weighted = weighted_transition_counts(&trajectory, &[], 1).unwrap();
        let plain = transition_counts(&trajectory, &[], 1, 0).unwrap();
        for i in 1..=2 {
            for (j, c) in plain.row(i) {
                assert!((weighted.get(i, j) - c).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_weighted_counts_balance_uneven_chunks() {
        // chunk 1: [1,2] once; chunk 2: [1,2] four times in a row
        let trajectory = [1usize, 2, 1, 2, 1, 2, 1, 2, 1, 2];
        let weighted = weighted_transition_counts(&trajectory, &[2], 1).unwrap();
        // chunk 1 contributes counts(1,2)=1 with weight 1; chunk 2 has
        // counts(1,2)=4, counts(2,1)=3, row-1 weight 2
        // row 1: (1*1 + 2*4) / (1 + 2) = 3
        assert!((weighted.get(1, 2) - 3.0).abs() < 1e-6);
        // row 2 only appears in chunk 2: sqrt(3)*3 / sqrt(3) = 3
        assert!((weighted.get(2, 1) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_counts_reject_bad_cutpoints() {
        let err = weighted_transition_counts(&[1, 2, 1], &[5], 1).unwrap_err();
        assert!(matches!(err, FelError::BadArgument(_)));
    }

    #[test]
    fn test_rows_are_stochastic_after_normalization() {
        let trajectory = [1usize, 1, 2, 2, 1, 3, 3, 2];
        let counts = transition_counts(&trajectory, &[], 1, 0).unwrap();
        let names = names_of(&trajectory);
        let probs = row_normalized_transition_probabilities(&counts, &names);
        for &i in &names {
            let sum = probs.row_sum(i);
            if sum > 0.0 {
                assert!((sum - 1.0).abs() < 1e-6, "row {i} sums to {sum}");
            }
        }
    }

    #[test]
    fn test_zero_sum_rows_stay_zero() {
        // state 3 only appears as the last frame, so its row has no counts
        let trajectory = [1usize, 1, 3];
        let counts = transition_counts(&trajectory, &[], 1, 0).unwrap();
        let names = names_of(&trajectory);
        let probs = row_normalized_transition_probabilities(&counts, &names);
        assert_eq!(probs.row_sum(3), 0.0);
    }

    #[test]
    fn test_lumped_probabilities_sum_member_mass() {
        // P over states {1, 2, 3}, lumping 2 and 3 into 2
        let mut probs = SparseMatrix::new(4);
        probs.set(1, 1, 0.5);
        probs.set(1, 2, 0.25);
        probs.set(1, 3, 0.25);
        probs.set(2, 2, 0.6);
        probs.set(2, 3, 0.4);
        probs.set(3, 3, 0.9);
        probs.set(3, 1, 0.1);
        let sinks: BTreeMap<usize, usize> =
            [(1, 1), (2, 2), (3, 2)].into_iter().collect();
        let lumped = updated_transition_probabilities(&probs, &sinks);
        assert!((lumped.get(1, 1) - 0.5).abs() < 1e-6);
        assert!((lumped.get(1, 2) - 0.5).abs() < 1e-6);
        // row 2 sums the mass of both members: not renormalized
        assert!((lumped.get(2, 2) - 1.9).abs() < 1e-6);
        assert!((lumped.get(2, 1) - 0.1).abs() < 1e-6);
        // a caller can renormalize the defect-carrying rows
        let names: BTreeSet<usize> = [1, 2].into_iter().collect();
        let renorm = row_normalized_transition_probabilities(&lumped, &names);
        assert!((renorm.row_sum(2) - 1.0).abs() < 1e-6);
    }
}
