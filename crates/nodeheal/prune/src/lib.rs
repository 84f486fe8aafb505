//! nodeheal Prune - Reclaiming disk by substituting pods with pruning jobs
//!
//! A pruning cycle takes one synced pod out of rotation, lets the pod builder
//! render its pruning variant in its place, waits for the job to finish and
//! then restores the normal pod. The cycle has five phases and no terminal
//! state:
//!
//! ```text
//! FindingCandidate -> WaitingForPodReplaced -> WaitingForComplete
//!        ^                                            |
//!        |                                            v
//! ConfirmPodRestoration <------------------------ RestoringPod
//! ```
//!
//! All status changes are buffered in a [`StatusPatch`](nodeheal_health::StatusPatch)
//! and persisted by the caller.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod collector;
pub mod control;
pub mod error;
pub mod machine;
pub mod pruner;

pub use collector::{CandidateCollector, PodLister, StatusCandidates};
pub use control::FullNodeControl;
pub use error::{PruneError, PruneResult};
pub use machine::{PruningConfig, PruningStateMachine, StepOutcome};
pub use pruner::Pruner;
