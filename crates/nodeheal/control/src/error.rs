//! Error types for nodeheal-control crate.

use nodeheal_health::HealthError;
use nodeheal_prune::PruneError;
use nodeheal_types::ResourceKey;
use thiserror::Error;

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum ControlError {
    /// An object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// The resource changed since it was read.
    #[error("conflict updating {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: ResourceKey,
        expected: u64,
        actual: u64,
    },

    /// Every persist attempt lost the optimistic-concurrency race.
    #[error("gave up persisting status of {key} after {attempts} attempts")]
    RetriesExhausted { key: ResourceKey, attempts: u32 },

    /// A pod or volume operation failed.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// An I/O call did not finish within its budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The cycle was cancelled by shutdown.
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// Health evaluation failed.
    #[error(transparent)]
    Health(#[from] HealthError),

    /// Pruning step failed.
    #[error(transparent)]
    Prune(#[from] PruneError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ControlError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ControlError::Conflict { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ControlError::Cancelled { .. })
    }
}

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;
