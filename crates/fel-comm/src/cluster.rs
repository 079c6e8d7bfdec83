//! SPMD worker-group substrate.
//!
//! Every worker runs the same pipeline, distinguished only by its rank; the
//! kernels suspend at the gather/broadcast/barrier calls in here and run
//! independently in between. Workers live on threads inside one process and
//! exchange typed messages over per-peer channels, so a dead peer surfaces
//! as a channel error instead of a hang.
//!
//! Payloads are self-describing enum variants. Neighbor records travel as
//! structured rows rather than index-as-float packed buffers, which keeps
//! frame counts above 2^24 valid.

use crossbeam_channel::{unbounded, Receiver, Sender};
use fel_core::{FelError, NeighborRow, Result};
use std::thread;

/// Rank of the root worker that merges gathered results.
pub const ROOT: usize = 0;

/// Typed message payload exchanged between workers.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Per-frame integer counts
    Counts(Vec<u64>),
    /// Per-frame floating-point values
    Scalars(Vec<f32>),
    /// Frame or position indices
    Indices(Vec<usize>),
    /// Per-frame nearest-neighbor records
    NeighborRows(Vec<NeighborRow>),
    /// Barrier token, carries no data
    Token,
}

/// Handle to the worker group, one per worker, passed through every kernel.
pub struct Cluster {
    rank: usize,
    n_workers: usize,
    /// Senders indexed by destination rank
    to_peer: Vec<Sender<Payload>>,
    /// Receivers indexed by source rank
    from_peer: Vec<Receiver<Payload>>,
}

impl Cluster {
    /// This worker's rank in `0..n_workers`.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of workers in the group.
    #[inline]
    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Whether this worker merges gathered results.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    /// Sends a payload to `dest`.
    pub fn send(&self, dest: usize, payload: Payload) -> Result<()> {
        self.to_peer[dest]
            .send(payload)
            .map_err(|_| FelError::reduction(format!("worker {dest} is gone")))
    }

    /// Receives the next payload from `src`, blocking.
    pub fn recv(&self, src: usize) -> Result<Payload> {
        self.from_peer[src]
            .recv()
            .map_err(|_| FelError::reduction(format!("worker {src} is gone")))
    }

    /// Synchronizes the whole group.
    ///
    /// Implemented over the same channels as data traffic: everyone reports
    /// to the root, the root answers. A failed peer turns the barrier into a
    /// [`FelError::Reduction`] instead of a deadlock.
    pub fn barrier(&self) -> Result<()> {
        if self.is_root() {
            for src in 1..self.n_workers {
                match self.recv(src)? {
                    Payload::Token => {}
                    other => {
                        return Err(FelError::reduction(format!(
                            "expected barrier token from worker {src}, got {other:?}"
                        )))
                    }
                }
            }
            for dest in 1..self.n_workers {
                self.send(dest, Payload::Token)?;
            }
        } else {
            self.send(ROOT, Payload::Token)?;
            match self.recv(ROOT)? {
                Payload::Token => {}
                other => {
                    return Err(FelError::reduction(format!(
                        "expected barrier token from root, got {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Collects every worker's payload at the root.
///
/// The root returns the payloads ordered by source rank (its own first);
/// other workers return `None` after sending theirs.
pub fn gather(cluster: &Cluster, payload: Payload) -> Result<Option<Vec<Payload>>> {
    if cluster.is_root() {
        let mut parts = Vec::with_capacity(cluster.n_workers());
        parts.push(payload);
        for src in 1..cluster.n_workers() {
            parts.push(cluster.recv(src)?);
        }
        Ok(Some(parts))
    } else {
        cluster.send(ROOT, payload)?;
        Ok(None)
    }
}

/// Distributes the root's payload to the whole group.
///
/// The root passes `Some(payload)`; everyone returns the root's value.
pub fn broadcast(cluster: &Cluster, payload: Option<Payload>) -> Result<Payload> {
    if cluster.is_root() {
        let payload =
            payload.ok_or_else(|| FelError::reduction("root broadcast without a payload"))?;
        for dest in 1..cluster.n_workers() {
            cluster.send(dest, payload.clone())?;
        }
        Ok(payload)
    } else {
        cluster.recv(ROOT)
    }
}

/// Element-wise sum of every worker's `local` buffer, visible to all workers
/// on return.
///
/// Gather at the root, barrier, broadcast of the merged buffer, barrier:
/// the same discipline every distributed kernel follows.
pub fn allreduce_sum(cluster: &Cluster, local: &mut [u64]) -> Result<()> {
    if let Some(parts) = gather(cluster, Payload::Counts(local.to_vec()))? {
        for part in parts.into_iter().skip(1) {
            let Payload::Counts(values) = part else {
                return Err(FelError::reduction("expected counts payload in sum reduction"));
            };
            if values.len() != local.len() {
                return Err(FelError::reduction(format!(
                    "count buffer length mismatch: {} vs {}",
                    values.len(),
                    local.len()
                )));
            }
            for (acc, v) in local.iter_mut().zip(values) {
                *acc += v;
            }
        }
    }
    cluster.barrier()?;
    let merged = broadcast(
        cluster,
        cluster.is_root().then(|| Payload::Counts(local.to_vec())),
    )?;
    if !cluster.is_root() {
        let Payload::Counts(values) = merged else {
            return Err(FelError::reduction("expected counts payload in sum broadcast"));
        };
        local.copy_from_slice(&values);
    }
    cluster.barrier()
}

/// Runs the same closure on `n_workers` threads, each with its own
/// [`Cluster`] handle.
///
/// Per-worker results come back ordered by rank. The first worker error is
/// propagated; a panicking worker is reported as a reduction failure, since
/// its peers lose their channels either way.
pub struct LocalCluster;

impl LocalCluster {
    pub fn run<T, F>(n_workers: usize, f: F) -> Result<Vec<T>>
    where
        F: Fn(&Cluster) -> Result<T> + Sync,
        T: Send,
    {
        if n_workers == 0 {
            return Err(FelError::bad_argument("worker count must be at least 1"));
        }
        // Channel matrix: senders[src][dst] feeds receivers[dst][src].
        let mut senders: Vec<Vec<Sender<Payload>>> =
            (0..n_workers).map(|_| Vec::with_capacity(n_workers)).collect();
        let mut receivers: Vec<Vec<Receiver<Payload>>> =
            (0..n_workers).map(|_| Vec::with_capacity(n_workers)).collect();
        for src in 0..n_workers {
            for dst in 0..n_workers {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }
        let mut handles: Vec<Cluster> = senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (to_peer, from_peer))| Cluster {
                rank,
                n_workers,
                to_peer,
                from_peer,
            })
            .collect();

        let f = &f;
        let results: Vec<Result<T>> = thread::scope(|scope| {
            let workers: Vec<_> = handles
                .drain(..)
                .map(|cluster| scope.spawn(move || f(&cluster)))
                .collect();
            workers
                .into_iter()
                .map(|w| {
                    w.join()
                        .unwrap_or_else(|_| Err(FelError::reduction("worker panicked")))
                })
                .collect()
        });
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_worker_roundtrip() {
        let results = LocalCluster::run(1, |cluster| {
            assert!(cluster.is_root());
            let mut buf = vec![1u64, 2, 3];
            allreduce_sum(cluster, &mut buf)?;
            Ok(buf)
        })
        .unwrap();
        assert_eq!(results, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_allreduce_sum_three_workers() {
        let results = LocalCluster::run(3, |cluster| {
            let mut buf = vec![cluster.rank() as u64; 4];
            allreduce_sum(cluster, &mut buf)?;
            Ok(buf)
        })
        .unwrap();
        // 0 + 1 + 2 per element, identical on every worker.
        for r in results {
            assert_eq!(r, vec![3, 3, 3, 3]);
        }
    }

    #[test]
    fn test_broadcast_reaches_all_workers() {
        let results = LocalCluster::run(4, |cluster| {
            cluster.barrier()?;
            let payload = cluster
                .is_root()
                .then(|| Payload::Indices(vec![7, 11]));
            match broadcast(cluster, payload)? {
                Payload::Indices(v) => Ok(v),
                other => panic!("unexpected payload {other:?}"),
            }
        })
        .unwrap();
        for r in results {
            assert_eq!(r, vec![7, 11]);
        }
    }

    #[test]
    fn test_gather_orders_by_rank() {
        let results = LocalCluster::run(3, |cluster| {
            let gathered = gather(cluster, Payload::Indices(vec![cluster.rank() * 10]))?;
            match gathered {
                Some(parts) => {
                    let flat: Vec<usize> = parts
                        .into_iter()
                        .map(|p| match p {
                            Payload::Indices(v) => v[0],
                            other => panic!("unexpected payload {other:?}"),
                        })
                        .collect();
                    Ok(Some(flat))
                }
                None => Ok(None),
            }
        })
        .unwrap();
        assert_eq!(results[0], Some(vec![0, 10, 20]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }

    #[test]
    fn test_worker_error_propagates() {
        let err = LocalCluster::run(2, |cluster| {
            if cluster.rank() == 1 {
                return Err(FelError::bad_argument("worker 1 gives up"));
            }
            // Root's barrier fails once worker 1 has dropped its channels.
            cluster.barrier().map(|_| ())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            FelError::BadArgument(_) | FelError::Reduction(_)
        ));
    }
}
