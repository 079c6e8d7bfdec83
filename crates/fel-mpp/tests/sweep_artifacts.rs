//! End-to-end check of the q_min sweep: a small two-state trajectory where
//! the rare state lumps into the dominant one, verified against every
//! emitted artifact.

use fel_mpp::{run_sweep, SweepConfig};
use std::fs;

#[test]
fn test_sweep_emits_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("net").to_string_lossy().into_owned();

    // state 2 shows up once and has a self-transition probability of 0; it
    // survives q_min = 0.0 untouched and lumps into state 1 at 0.5
    let trajectory = vec![1usize, 1, 1, 1, 1, 2, 1, 1, 1, 1];
    let free_energy = vec![0.0f32, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];

    let config = SweepConfig {
        basename: basename.clone(),
        q_min_from: 0.5,
        q_min_to: 0.6,
        q_min_step: 0.1,
        lagtime: 1,
        concat_limits: Vec::new(),
        diff_size_chunks: false,
    };
    let summary = run_sweep(&config, trajectory, free_energy).unwrap();

    assert_eq!(summary.levels.len(), 2);
    assert_eq!(summary.levels[0].n_states, 1);
    assert_eq!(summary.levels[0].n_lumped, 1);
    assert_eq!(summary.levels[1].n_states, 1);
    assert_eq!(summary.levels[1].n_lumped, 0);

    // per-level trajectory: everything in state 1 after the first level
    let traj_file = fs::read_to_string(format!("{basename}_traj_0.500.dat")).unwrap();
    let states: Vec<usize> = traj_file
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect();
    assert_eq!(states, vec![1; 10]);
    assert!(fs::metadata(format!("{basename}_traj_0.600.dat")).is_ok());

    // per-level populations
    let pop_file = fs::read_to_string(format!("{basename}_pop_0.500.dat")).unwrap();
    assert_eq!(pop_file, "1 10\n");

    // cumulative lumping register: 2 lumped into 1 at the first level
    let transitions = fs::read_to_string(format!("{basename}_transitions.dat")).unwrap();
    assert_eq!(transitions, "2 1 0.500\n");

    // survivors' books
    let max_pop = fs::read_to_string(format!("{basename}_max_pop.dat")).unwrap();
    assert_eq!(max_pop, "1 10\n");
    let max_qmin = fs::read_to_string(format!("{basename}_max_qmin.dat")).unwrap();
    assert_eq!(max_qmin, "1 0.600\n");

    // machine-readable summary
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(format!("{basename}_summary.json")).unwrap())
            .unwrap();
    assert_eq!(json["levels"].as_array().unwrap().len(), 2);
    assert_eq!(json["levels"][0]["n_states"], 1);
}

#[test]
fn test_sweep_isolates_sub_trajectories() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("split").to_string_lossy().into_owned();

    // the only 1 -> 2 window crosses the cutpoint; within its own chunk
    // state 2 is perfectly stable and must survive
    let trajectory = vec![1usize, 1, 1, 1, 2, 2, 2, 2];
    let free_energy = vec![0.0f32; 8];
    let config = SweepConfig {
        basename: basename.clone(),
        q_min_from: 0.9,
        q_min_to: 0.9,
        q_min_step: 0.1,
        lagtime: 1,
        concat_limits: vec![4],
        diff_size_chunks: false,
    };
    let summary = run_sweep(&config, trajectory, free_energy).unwrap();
    assert_eq!(summary.levels.len(), 1);
    assert_eq!(summary.levels[0].n_states, 2);
    let transitions = fs::read_to_string(format!("{basename}_transitions.dat")).unwrap();
    assert!(transitions.is_empty());
}
