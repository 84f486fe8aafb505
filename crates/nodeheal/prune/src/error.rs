//! Error types for nodeheal-prune crate.

use thiserror::Error;

/// Errors that can occur while driving a pruning cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PruneError {
    /// No candidates are registered for the cycle in flight.
    ///
    /// Not a failure: it means the bookkeeping no longer matches the
    /// observed pods and the cycle starts over.
    #[error("there are no candidates")]
    NoCandidates,

    /// Listing owned pods failed.
    #[error("list pods: {0}")]
    ListPods(String),

    /// Disk usage collection failed.
    #[error("collect disk usage: {0}")]
    CollectUsage(String),

    /// The candidate's plain pod still exists.
    #[error("pod {0} not replaced yet")]
    NotReplaced(String),

    /// The candidate's plain pod has not come back yet.
    #[error("pod {0} not restored yet")]
    NotRestored(String),

    /// A collaborator call did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl PruneError {
    /// Transient errors clear up on their own and are retried next cycle.
    pub fn is_transient(&self) -> bool {
        !matches!(self, PruneError::NoCandidates)
    }

    /// Still waiting on the pod builder rather than failing.
    pub fn is_pending(&self) -> bool {
        matches!(self, PruneError::NotReplaced(_) | PruneError::NotRestored(_))
    }
}

/// Result type for pruning operations.
pub type PruneResult<T> = Result<T, PruneError>;
