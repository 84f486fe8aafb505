//! Status owned by the self-healing controller.
//!
//! All entries are created lazily on first need and only mutated through
//! the controller's persist step. Maps are ordered so that serialized status
//! is stable between cycles.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::duration_serde;
use crate::Quantity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullNodeStatus {
    /// Per-pod sync info keyed by pod name, re-derived every cycle.
    #[serde(default)]
    pub sync_info: BTreeMap<String, SyncInfoPodStatus>,

    #[serde(default)]
    pub self_healing: SelfHealingStatus,
}

/// Last observed sync state of one pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfoPodStatus {
    /// When the observation was taken.
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub height: Option<u64>,

    #[serde(default)]
    pub in_sync: Option<bool>,

    /// Status collection error, if the pod could not be queried.
    #[serde(default)]
    pub error: Option<String>,

    /// When the height last changed.
    pub last_block_timestamp: DateTime<Utc>,

    /// How long the height has been flat. Zero right after any change.
    #[serde(with = "duration_serde")]
    pub height_retain_time: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfHealingStatus {
    /// PVC resize requests keyed by volume name.
    #[serde(default)]
    pub pvc_auto_scale: BTreeMap<String, PvcAutoScaleStatus>,

    /// Drift-deletion failure logs keyed by pod name.
    #[serde(default)]
    pub regen_pvc: BTreeMap<String, RegenPvcState>,

    /// Singleton pruning state; absent until pruning first runs.
    #[serde(default)]
    pub pruning: Option<PruningStatus>,
}

/// A PVC size requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcAutoScaleStatus {
    pub requested_size: Quantity,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegenPvcPhase {
    #[default]
    NotYet,
    Regenerating,
}

/// Per-pod failure log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenPvcState {
    /// Failure timestamps, oldest first.
    #[serde(default)]
    pub failure_times: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub phase: RegenPvcPhase,
}

/// Phases of the pruning cycle. There is no terminal phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PruningPhase {
    #[default]
    FindingCandidate,
    WaitingForPodReplaced,
    WaitingForComplete,
    RestoringPod,
    ConfirmPodRestoration,
}

impl fmt::Display for PruningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PruningPhase::FindingCandidate => "FindingCandidate",
            PruningPhase::WaitingForPodReplaced => "WaitingForPodReplaced",
            PruningPhase::WaitingForComplete => "WaitingForComplete",
            PruningPhase::RestoringPod => "RestoringPod",
            PruningPhase::ConfirmPodRestoration => "ConfirmPodRestoration",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruningCandidate {
    pub pod_name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruningStatus {
    pub phase: PruningPhase,

    /// Candidates of the cycle in flight; empty in FindingCandidate.
    #[serde(default)]
    pub candidates: BTreeMap<String, PruningCandidate>,

    /// Pods the builder must render as pruning variants, with when pruning began.
    #[serde(default)]
    pub pod_pruning_status: BTreeMap<String, DateTime<Utc>>,
}

impl PruningStatus {
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }
}
