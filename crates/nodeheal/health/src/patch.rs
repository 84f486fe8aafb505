//! Buffered status mutations.
//!
//! Evaluators never write status directly. They append semantic operations
//! to a [`StatusPatch`], which the persist step applies to the freshest
//! version of the resource. Re-applying the same patch after a conflict
//! recomputes each operation against the new state rather than overwriting
//! it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nodeheal_types::{
    FullNodeStatus, PruningCandidate, PruningPhase, PvcAutoScaleStatus, SyncInfoPodStatus,
};

use crate::failure_window::FailureWindowTracker;

/// A single semantic status mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOp {
    /// Replace the per-pod sync info.
    SetSyncInfo(BTreeMap<String, SyncInfoPodStatus>),

    /// Record a PVC resize request, replacing any previous one for the volume.
    RequestPvcResize {
        volume: String,
        request: PvcAutoScaleStatus,
    },

    /// Record a drift deletion in a pod's failure log.
    RecordPodFailure {
        pod: String,
        at: DateTime<Utc>,
        tracker: FailureWindowTracker,
    },

    /// Move the pruning cycle to `phase`, creating the pruning status if needed.
    SetPruningPhase(PruningPhase),

    /// Register a candidate and mark its pod for substitution.
    AddPruningCandidate {
        key: String,
        candidate: PruningCandidate,
        started_at: DateTime<Utc>,
    },

    /// Stop substituting the candidate's pod.
    ClearPodPruning { key: String },

    /// Forget every candidate of the current cycle.
    ClearPruningCandidates,
}

impl StatusOp {
    /// Apply to `status`.
    ///
    /// Returns `true` only for a [`StatusOp::RecordPodFailure`] that crossed
    /// the regeneration threshold.
    pub fn apply(&self, status: &mut FullNodeStatus) -> bool {
        let healing = &mut status.self_healing;
        match self {
            StatusOp::SetSyncInfo(info) => {
                status.sync_info = info.clone();
            }
            StatusOp::RequestPvcResize { volume, request } => {
                healing.pvc_auto_scale.insert(volume.clone(), request.clone());
            }
            StatusOp::RecordPodFailure { pod, at, tracker } => {
                let state = healing.regen_pvc.entry(pod.clone()).or_default();
                return tracker.record_failure(state, *at);
            }
            StatusOp::SetPruningPhase(phase) => {
                healing.pruning.get_or_insert_with(Default::default).phase = *phase;
            }
            StatusOp::AddPruningCandidate {
                key,
                candidate,
                started_at,
            } => {
                let pruning = healing.pruning.get_or_insert_with(Default::default);
                pruning.candidates.insert(key.clone(), candidate.clone());
                pruning.pod_pruning_status.insert(key.clone(), *started_at);
            }
            StatusOp::ClearPodPruning { key } => {
                if let Some(pruning) = healing.pruning.as_mut() {
                    pruning.pod_pruning_status.remove(key);
                }
            }
            StatusOp::ClearPruningCandidates => {
                if let Some(pruning) = healing.pruning.as_mut() {
                    pruning.candidates.clear();
                }
            }
        }
        false
    }
}

/// Ordered list of status operations for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPatch {
    ops: Vec<StatusOp>,
}

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: StatusOp) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, other: StatusPatch) {
        self.ops.extend(other.ops);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[StatusOp] {
        &self.ops
    }

    /// Apply every operation in order.
    pub fn apply(&self, status: &mut FullNodeStatus) {
        for op in &self.ops {
            op.apply(status);
        }
    }
}
