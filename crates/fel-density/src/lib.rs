//! # fel-density
//!
//! Distributed density kernels over the coordinate matrix:
//! - **population**: neighbor counts inside one or more radii
//! - **neighbors**: nearest neighbor and nearest lower-free-energy neighbor
//! - **hd_neighborhood**: neighborhood restricted to a density-ranked prefix
//! - **free_energy**: density proxy derived from populations
//! - **screening**: initial clusters from the low-free-energy prefix, plus
//!   assignment of the remaining frames
//!
//! All kernels take a [`fel_comm::Cluster`] handle; within a worker they
//! parallelize over rows with rayon.

pub mod free_energy;
pub mod hd_neighborhood;
pub mod neighbors;
pub mod population;
pub mod screening;

pub use free_energy::free_energies;
pub use hd_neighborhood::high_density_neighborhood;
pub use neighbors::nearest_neighbors;
pub use population::populations;
pub use screening::{assign_low_density_frames, initial_density_clustering, mean_neighbor_dist2};
