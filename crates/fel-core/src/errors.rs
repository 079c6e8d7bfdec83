//! Error types for the FEL toolkit.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all FEL operations.
///
/// Every variant is fatal; there is no local recovery anywhere in the
/// pipeline. Partial output files may remain on disk after a failure.
#[derive(Error, Debug)]
pub enum FelError {
    /// Invalid or missing command-line input
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// File access errors with the offending path
    #[error("cannot access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed file contents
    #[error("parse error in '{path}', line {line}: {what}")]
    Parse {
        path: PathBuf,
        line: usize,
        what: String,
    },

    /// A microstate with no positive outgoing transition probability
    #[error(
        "state {0} has no transition candidates; check that the input \
         trajectory covers the state space"
    )]
    DeadState(usize),

    /// MPP fixed-point iteration exceeded its iteration limit
    #[error("metastability lumping did not converge within {max_iter} iterations")]
    NotConverged { max_iter: usize },

    /// Inter-worker communication failure
    #[error("worker reduction failed: {0}")]
    Reduction(String),

    /// Serialization of machine-readable artifacts
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FelError {
    /// Creates a bad-argument error.
    pub fn bad_argument(message: impl Into<String>) -> Self {
        FelError::BadArgument(message.into())
    }

    /// Creates an I/O error carrying the path that failed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FelError::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error for a specific line of a file.
    pub fn parse(path: impl Into<PathBuf>, line: usize, what: impl Into<String>) -> Self {
        FelError::Parse {
            path: path.into(),
            line,
            what: what.into(),
        }
    }

    /// Creates a reduction error.
    pub fn reduction(message: impl Into<String>) -> Self {
        FelError::Reduction(message.into())
    }
}

/// Result type alias for FEL operations.
pub type Result<T> = std::result::Result<T, FelError>;
