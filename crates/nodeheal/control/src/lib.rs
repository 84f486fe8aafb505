//! nodeheal Control - Reconciliation for self-healing full-node fleets
//!
//! The [`Orchestrator`] runs one level-triggered cycle for a resource: it
//! loads the resource once, evaluates pruning, PVC autoscaling and height
//! drift mitigation in that order, and persists every status change in a
//! single optimistic write. The [`Scheduler`] drives cycles for many
//! resources in parallel while never running two cycles for the same key at
//! once.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler ── per-key lock ──► Orchestrator::reconcile
//!                                   │
//!            ┌──────────────────────┼──────────────────────┐
//!            ▼                      ▼                      ▼
//!   PruningStateMachine      CapacityPlanner          DriftDetector
//!            │                      │                      │
//!            └──────────► StatusPatch ◄────────────────────┘
//!                               │
//!                               ▼
//!                    StatusSyncer (CAS + retry)
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gateway;
pub mod orchestrator;
pub mod scheduler;
pub mod store;
pub mod syncer;

pub use config::ControllerConfig;
pub use context::CycleContext;
pub use error::{ControlError, ControlResult};
pub use events::EventReporter;
pub use gateway::{ignore_not_found, PodGateway, VolumeClaim};
pub use orchestrator::{Collaborators, Orchestrator, ReconcileOutcome};
pub use scheduler::Scheduler;
pub use store::{InMemoryResourceStore, ResourceStore};
pub use syncer::{RetryingStatusSyncer, StatusSyncer};
