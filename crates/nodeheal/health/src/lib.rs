//! nodeheal Health - Decision logic for keeping full nodes healthy
//!
//! Every evaluator in this crate is a pure function of observed state and the
//! resource spec. None of them perform I/O or persist anything; the
//! orchestrator gathers observations through the collaborator traits in
//! [`collector`] and applies the resulting decisions in one persist step.
//!
//! ## Evaluators
//!
//! - [`CapacityPlanner`]: disk usage samples → PVC resize requests
//! - [`FailureWindowTracker`]: per-pod failure log → regenerate-PVC trigger
//! - [`DriftDetector`]: status snapshot → lagging pods, bounded by the rollout budget
//! - [`derive_sync_info`]: status snapshot → per-pod sync info with height retention
//!
//! Decisions that change status are expressed as a [`StatusPatch`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod capacity;
pub mod collector;
pub mod drift;
pub mod error;
pub mod failure_window;
pub mod patch;
pub mod rollout;
pub mod sync_info;

pub use capacity::{next_capacity, CapacityPlanner, ResizePlan};
pub use collector::{
    DiskUsageProvider, PvcDiskUsage, StatusCollection, StatusCollector, StatusItem,
};
pub use drift::DriftDetector;
pub use error::{HealthError, HealthResult};
pub use failure_window::FailureWindowTracker;
pub use patch::{StatusOp, StatusPatch};
pub use rollout::{available_pods, compute_rollout, RolloutBudgetFn, DEFAULT_MIN_READY};
pub use sync_info::derive_sync_info;
