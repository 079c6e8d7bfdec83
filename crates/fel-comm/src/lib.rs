//! # fel-comm
//!
//! Work partitioning and the worker-group substrate underneath the density
//! kernels. The planner splits the upper-triangular pair space (or a plain
//! row range) across workers; the cluster module runs the same pipeline on
//! every worker and provides the gather/broadcast/barrier primitives the
//! kernels reduce through.

pub mod cluster;
pub mod planner;

pub use cluster::{broadcast, gather, allreduce_sum, Cluster, LocalCluster, Payload, ROOT};
pub use planner::{rectangular_partition, triangular_partition, worker_rows};
