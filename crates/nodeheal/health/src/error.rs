//! Error types for nodeheal-health crate.

use nodeheal_types::{ErrorList, QuantityError};
use thiserror::Error;

/// Errors produced while evaluating self-heal decisions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HealthError {
    /// The increase string is neither a valid percentage nor a valid quantity.
    #[error("invalid increase quantity {increase:?}: {source}")]
    InvalidIncrease {
        increase: String,
        source: ErrorList<QuantityError>,
    },

    /// Growing by the increase does not fit a quantity.
    #[error("increasing by {increase:?} overflows the volume size")]
    CapacityOverflow { increase: String },

    /// Disk usage or status collection failed.
    #[error("collection failed: {0}")]
    CollectionFailed(String),

    /// A collection call did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;
