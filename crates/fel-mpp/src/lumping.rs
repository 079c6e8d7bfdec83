//! The MPP lumping fixed point for one metastability threshold.
//!
//! Per round: transition probabilities from the current trajectory, a
//! single-step future state per microstate, most-probable paths, path sinks,
//! and a relabeling of the trajectory onto the sinks. The round trip repeats
//! until the trajectory stops changing.
//!
//! All tie-breaking walks state ids in ascending order and keeps the first
//! optimum, so results are independent of container iteration quirks.

use crate::counts::{
    row_normalized_transition_probabilities, transition_counts, weighted_transition_counts,
};
use fel_core::{FelError, Result, SparseMatrix};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of rounds of the fixed-point iteration.
pub const MAX_ITERATIONS: usize = 100;

/// Frames per microstate.
pub fn microstate_populations(
    trajectory: &[usize],
    names: &BTreeSet<usize>,
) -> BTreeMap<usize, usize> {
    let mut populations: BTreeMap<usize, usize> = names.iter().map(|&n| (n, 0)).collect();
    for state in trajectory {
        if let Some(count) = populations.get_mut(state) {
            *count += 1;
        }
    }
    populations
}

/// Lowest frame free energy per microstate.
pub fn microstate_min_free_energy(
    trajectory: &[usize],
    free_energy: &[f32],
) -> BTreeMap<usize, f32> {
    let mut min_fe: BTreeMap<usize, f32> = BTreeMap::new();
    for (&state, &fe) in trajectory.iter().zip(free_energy.iter()) {
        min_fe
            .entry(state)
            .and_modify(|current| {
                if fe < *current {
                    *current = fe;
                }
            })
            .or_insert(fe);
    }
    min_fe
}

/// Chooses every microstate's single-step future.
///
/// A state whose self-transition probability reaches `q_min` stays put.
/// Otherwise the most probable other state wins; among equally probable
/// candidates the one with the lowest microstate minimum free energy is
/// taken, and equal minima fall back to the smallest id. A state without
/// any positive outgoing probability is a dead end and aborts the lumping.
pub fn single_step_future_state(
    probs: &SparseMatrix,
    names: &BTreeSet<usize>,
    q_min: f32,
    min_free_energy: &BTreeMap<usize, f32>,
) -> Result<BTreeMap<usize, usize>> {
    let mut future = BTreeMap::new();
    for &i in names {
        let mut candidates: Vec<usize> = Vec::new();
        if probs.get(i, i) >= q_min {
            candidates.push(i);
        } else {
            // the state is not metastable here: move somewhere else, even
            // if staying would be more probable
            let mut max_prob = 0.0f32;
            for &j in names {
                if i == j {
                    continue;
                }
                let p = probs.get(i, j);
                if p > max_prob {
                    max_prob = p;
                    candidates.clear();
                    candidates.push(j);
                } else if p == max_prob && max_prob > 0.0 {
                    candidates.push(j);
                }
            }
        }
        let fe_of = |state: usize| {
            min_free_energy
                .get(&state)
                .copied()
                .unwrap_or(f32::INFINITY)
        };
        match candidates.as_slice() {
            [] => return Err(FelError::DeadState(i)),
            [only] => {
                future.insert(i, *only);
            }
            several => {
                // min_by keeps the first optimum; candidates are in
                // ascending id order
                let best = several
                    .iter()
                    .copied()
                    .min_by(|&a, &b| fe_of(a).total_cmp(&fe_of(b)))
                    .unwrap_or(several[0]);
                future.insert(i, best);
            }
        }
    }
    Ok(future)
}

/// Follows the future map from every state until a state repeats.
///
/// The revisiting step is not part of the path.
pub fn most_probable_path(
    future: &BTreeMap<usize, usize>,
    names: &BTreeSet<usize>,
) -> BTreeMap<usize, Vec<usize>> {
    let mut mpp = BTreeMap::new();
    for &i in names {
        let mut path = vec![i];
        let mut visited: BTreeSet<usize> = BTreeSet::from([i]);
        let mut state = i;
        while let Some(&next) = future.get(&state) {
            if visited.contains(&next) {
                break;
            }
            path.push(next);
            visited.insert(next);
            state = next;
        }
        mpp.insert(i, path);
    }
    mpp
}

/// Picks the sink of every most-probable path.
///
/// Candidates are the metastable path states (`P[j][j] > q_min`), or the
/// whole path when none qualifies. The lowest microstate minimum free
/// energy wins; equal minima fall back to the highest population and then
/// to the smallest id.
pub fn path_sinks(
    trajectory: &[usize],
    mpp: &BTreeMap<usize, Vec<usize>>,
    probs: &SparseMatrix,
    names: &BTreeSet<usize>,
    q_min: f32,
    free_energy: &[f32],
) -> BTreeMap<usize, usize> {
    let populations = microstate_populations(trajectory, names);
    let min_free_energy = microstate_min_free_energy(trajectory, free_energy);
    let fe_of = |state: usize| {
        min_free_energy
            .get(&state)
            .copied()
            .unwrap_or(f32::INFINITY)
    };
    let pop_of = |state: usize| populations.get(&state).copied().unwrap_or(0);

    let mut sinks = BTreeMap::new();
    for &i in names {
        let path = match mpp.get(&i) {
            Some(path) => path.as_slice(),
            None => continue,
        };
        let mut metastable: Vec<usize> = path
            .iter()
            .copied()
            .filter(|&j| probs.get(j, j) > q_min)
            .collect();
        if metastable.is_empty() {
            // no stable state on the path: the whole path is eligible
            metastable = path.to_vec();
        }
        let lowest = metastable
            .iter()
            .map(|&s| fe_of(s))
            .fold(f32::INFINITY, f32::min);
        let mut candidates: Vec<usize> = metastable
            .into_iter()
            .filter(|&s| fe_of(s) == lowest)
            .collect();
        candidates.sort_unstable();
        let mut sink = candidates[0];
        for &s in &candidates[1..] {
            if pop_of(s) > pop_of(sink) {
                sink = s;
            }
        }
        sinks.insert(i, sink);
    }
    sinks
}

/// Result of one converged metastability level.
#[derive(Debug, Clone)]
pub struct LumpingResult {
    /// Refined trajectory, every frame relabeled to its sink
    pub trajectory: Vec<usize>,
    /// All lumpings applied at this level, only entries with `from != to`
    pub lumping: BTreeMap<usize, usize>,
    /// Rounds until the trajectory stopped changing
    pub iterations: usize,
}

/// Iterates the MPP lumping for one `q_min` until the trajectory is fixed.
///
/// `diff_size_chunks` selects the chunk-weighted count matrix; otherwise a
/// plain count matrix with boundary suppression is used. Fails with
/// [`FelError::NotConverged`] after [`MAX_ITERATIONS`] rounds and with
/// [`FelError::DeadState`] if a state loses all outgoing probability.
pub fn fixed_metastability_clustering(
    initial_trajectory: &[usize],
    concat_limits: &[usize],
    diff_size_chunks: bool,
    q_min: f32,
    lagtime: usize,
    free_energy: &[f32],
) -> Result<LumpingResult> {
    let mut trajectory = initial_trajectory.to_vec();
    let mut lumping: BTreeMap<usize, usize> = BTreeMap::new();
    for iteration in 0..MAX_ITERATIONS {
        let names: BTreeSet<usize> = trajectory.iter().copied().collect();
        if iteration == 0 && names.contains(&0) {
            log::warn!(
                "state 0 is present in the trajectory; microstate input may be \
                 missing its final seeded density clustering"
            );
        }
        log::info!("iteration {} for q_min {:.3}", iteration + 1, q_min);

        log::debug!("  calculating transition probabilities");
        let counts = if diff_size_chunks {
            weighted_transition_counts(&trajectory, concat_limits, lagtime)?
        } else {
            transition_counts(&trajectory, concat_limits, lagtime, 0)?
        };
        let probs = row_normalized_transition_probabilities(&counts, &names);

        log::debug!("  calculating future states");
        let min_fe = microstate_min_free_energy(&trajectory, free_energy);
        let future = single_step_future_state(&probs, &names, q_min, &min_fe)?;

        log::debug!("  calculating most probable paths");
        let mpp = most_probable_path(&future, &names);

        log::debug!("  calculating path sinks");
        let sinks = path_sinks(&trajectory, &mpp, &probs, &names, q_min, free_energy);

        log::debug!("  lumping trajectory");
        let lumped: Vec<usize> = trajectory
            .iter()
            .map(|state| sinks.get(state).copied().unwrap_or(*state))
            .collect();
        for (&from, &to) in &sinks {
            if from != to {
                lumping.insert(from, to);
            }
        }
        let converged = lumped == trajectory;
        trajectory = lumped;
        if converged {
            return Ok(LumpingResult {
                trajectory,
                lumping,
                iterations: iteration + 1,
            });
        }
    }
    Err(FelError::NotConverged {
        max_iter: MAX_ITERATIONS,
    })
}
