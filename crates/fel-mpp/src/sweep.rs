//! The `q_min` sweep: lump at every level, emit artifacts, keep the books.

use crate::lumping::{fixed_metastability_clustering, microstate_populations};
use fel_core::{io, FelError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

/// Parameters of one sweep run.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Basename prefixed to every output file
    pub basename: String,
    /// First metastability threshold
    pub q_min_from: f32,
    /// Last metastability threshold, inclusive
    pub q_min_to: f32,
    /// Threshold increment, must be positive
    pub q_min_step: f32,
    /// Lag in frames for transition counting
    pub lagtime: usize,
    /// Cutpoints of concatenated sub-trajectories
    pub concat_limits: Vec<usize>,
    /// Weight per-chunk counts instead of suppressing boundary windows
    pub diff_size_chunks: bool,
}

/// Book-keeping of one sweep level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelSummary {
    pub q_min: f32,
    /// Microstates surviving at this level
    pub n_states: usize,
    /// Rounds until the lumping converged
    pub iterations: usize,
    /// Microstates lumped away at this level
    pub n_lumped: usize,
}

/// Machine-readable record of the whole sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub levels: Vec<LevelSummary>,
}

/// Sweeps `q_min` over the configured ladder, refining the trajectory level
/// by level.
///
/// Per level the converged trajectory and its populations are written to
/// `<base>_traj_<q>.dat` and `<base>_pop_<q>.dat`; lumpings feed the
/// cumulative register written to `<base>_transitions.dat` at the end,
/// together with `<base>_max_pop.dat`, `<base>_max_qmin.dat` and the JSON
/// summary `<base>_summary.json`.
pub fn run_sweep(
    config: &SweepConfig,
    initial_trajectory: Vec<usize>,
    free_energy: Vec<f32>,
) -> Result<SweepSummary> {
    if config.q_min_step <= 0.0 {
        return Err(FelError::bad_argument("q_min step must be positive"));
    }
    if free_energy.len() != initial_trajectory.len() {
        return Err(FelError::bad_argument(format!(
            "trajectory and free energies disagree in length ({} vs {})",
            initial_trajectory.len(),
            free_energy.len()
        )));
    }

    let mut trajectory = initial_trajectory;
    let mut transitions: BTreeMap<usize, (usize, f32)> = BTreeMap::new();
    let mut max_pop: BTreeMap<usize, usize> = BTreeMap::new();
    let mut max_qmin: BTreeMap<usize, f32> = BTreeMap::new();
    let mut levels = Vec::new();

    let tolerance = config.q_min_step * 1e-3;
    let mut level = 0usize;
    loop {
        let q_min = config.q_min_from + level as f32 * config.q_min_step;
        if q_min > config.q_min_to + tolerance {
            break;
        }
        log::info!("lumping trajectory at q_min {:.3}", q_min);
        let result = fixed_metastability_clustering(
            &trajectory,
            &config.concat_limits,
            config.diff_size_chunks,
            q_min,
            config.lagtime,
            &free_energy,
        )?;
        trajectory = result.trajectory;
        io::write_column(
            format!("{}_traj_{:.3}.dat", config.basename, q_min),
            &trajectory,
        )?;

        for (&from, &to) in &result.lumping {
            transitions.insert(from, (to, q_min));
        }

        let names: BTreeSet<usize> = trajectory.iter().copied().collect();
        let populations = microstate_populations(&trajectory, &names);
        io::write_map(
            format!("{}_pop_{:.3}.dat", config.basename, q_min),
            &populations,
        )?;
        for &id in &names {
            max_pop.insert(id, populations.get(&id).copied().unwrap_or(0));
            max_qmin.insert(id, q_min);
        }

        levels.push(LevelSummary {
            q_min,
            n_states: names.len(),
            iterations: result.iterations,
            n_lumped: result.lumping.len(),
        });
        level += 1;
    }

    let transition_lines: BTreeMap<usize, String> = transitions
        .iter()
        .map(|(&from, &(to, q_min))| (from, format!("{to} {q_min:.3}")))
        .collect();
    io::write_map(format!("{}_transitions.dat", config.basename), &transition_lines)?;
    io::write_map(format!("{}_max_pop.dat", config.basename), &max_pop)?;
    let max_qmin_lines: BTreeMap<usize, String> = max_qmin
        .iter()
        .map(|(&id, &q)| (id, format!("{q:.3}")))
        .collect();
    io::write_map(format!("{}_max_qmin.dat", config.basename), &max_qmin_lines)?;

    let summary = SweepSummary { levels };
    let summary_path = format!("{}_summary.json", config.basename);
    let text = serde_json::to_string_pretty(&summary)?;
    fs::write(&summary_path, text).map_err(|e| FelError::io(&summary_path, e))?;
    Ok(summary)
}
