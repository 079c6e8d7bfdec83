//! # fel-mpp
//!
//! Most-probable-path metastability refinement of a microstate trajectory:
//! - **counts**: transition-count matrices with sub-trajectory boundary
//!   handling, weighted variants, row normalization and macrostate lumping
//! - **lumping**: the fixed-point iteration of future states, most probable
//!   paths and path sinks for one `q_min`
//! - **sweep**: the `q_min` ladder, cumulative lumping register and artifact
//!   emission

pub mod counts;
pub mod lumping;
pub mod sweep;

pub use counts::{
    row_normalized_transition_probabilities, transition_counts, updated_transition_probabilities,
    weighted_transition_counts,
};
pub use lumping::{
    fixed_metastability_clustering, microstate_min_free_energy, microstate_populations,
    most_probable_path, path_sinks, single_step_future_state, LumpingResult, MAX_ITERATIONS,
};
pub use sweep::{run_sweep, LevelSummary, SweepConfig, SweepSummary};
