//! Event types for the self-healing audit trail
//!
//! Every action the controller takes, and every notable failure, is recorded
//! as a human-readable event so operators can follow what happened without
//! log access.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PruningPhase, ResourceKey};

/// Envelope wrapping all self-heal events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Resource the event is about
    pub resource: ResourceKey,

    /// Event severity
    pub severity: EventSeverity,

    /// Short machine-friendly reason, e.g. `PVCAutoScale`
    pub reason: String,

    /// The actual event
    pub event: SelfHealEvent,
}

impl SelfHealEventEnvelope {
    pub fn new(resource: ResourceKey, event: SelfHealEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            resource,
            severity: event.severity(),
            reason: event.reason().to_string(),
            event,
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> String {
        self.event.to_string()
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Informational event
    Info,
    /// Warning event
    Warning,
}

/// Self-heal events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelfHealEvent {
    // ═══════════════════════════════════════════════════════════════════
    // PVC AUTOSCALE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Disk expansion requested for one or more volumes
    PvcResizeRequested { volumes: Vec<String> },

    /// Disk usage could not be collected. Details are only in the logs.
    PvcUsageCollectionFailed,

    /// Resize could not be computed or signalled
    PvcResizeSignalFailed { reason: String },

    // ═══════════════════════════════════════════════════════════════════
    // HEIGHT DRIFT EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Lagging pods were deleted for re-creation
    PodsDeletedForDrift {
        threshold_height: u64,
        retention_time: Option<Duration>,
        deleted: usize,
    },

    /// A lagging pod could not be deleted
    DriftPodDeleteFailed { pod: String, reason: String },

    /// A pod's PVC is being regenerated after repeated failures
    PvcRegenerating { pod: String, window: Duration },

    /// PVC regeneration bookkeeping or deletion failed
    PvcRegenerationFailed { pod: String, reason: String },

    // ═══════════════════════════════════════════════════════════════════
    // PRUNING EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Disk usage for pruning could not be collected
    PruningUsageCollectionFailed,

    /// A pod was selected for pruning
    PruningCandidateFound { pod: String },

    /// The candidate's plain pod still exists
    PodReplacementPending { reason: String },

    /// Bookkeeping contradicted the observed pods and the cycle restarted
    PruningPhaseReset { from: PruningPhase, reason: String },

    /// Pruning job status could not be checked
    PruningCheckFailed { reason: String },

    /// Pruning jobs finished for the candidates
    PruningComplete { pods: Vec<String> },

    /// Restoration could not be signalled
    PodRestorationFailed { reason: String },

    /// Restored pods are not observed yet
    PodRestorationPending { reason: String },

    /// Plain pods are back and the pruning cycle finished
    PodRestored { pods: Vec<String> },

    // ═══════════════════════════════════════════════════════════════════
    // PERSISTENCE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Status could not be written this cycle
    StatusPersistFailed { reason: String },
}

impl SelfHealEvent {
    /// Short reason recorded with the event.
    pub fn reason(&self) -> &'static str {
        match self {
            SelfHealEvent::PvcResizeRequested { .. } => "PVCAutoScale",
            SelfHealEvent::PvcUsageCollectionFailed => "PVCAutoScaleCollectUsage",
            SelfHealEvent::PvcResizeSignalFailed { .. } => "PVCAutoScaleSignalResize",
            SelfHealEvent::PodsDeletedForDrift { .. } => "HeightDriftMitigation",
            SelfHealEvent::DriftPodDeleteFailed { .. } => "HeightDriftMitigationDeletePod",
            SelfHealEvent::PvcRegenerating { .. } | SelfHealEvent::PvcRegenerationFailed { .. } => {
                "PVCRegenerating"
            }
            SelfHealEvent::PruningUsageCollectionFailed
            | SelfHealEvent::PruningCandidateFound { .. }
            | SelfHealEvent::PodReplacementPending { .. }
            | SelfHealEvent::PruningPhaseReset { .. }
            | SelfHealEvent::PruningComplete { .. }
            | SelfHealEvent::PodRestored { .. } => "PVCPruning",
            SelfHealEvent::PruningCheckFailed { .. } => "PruningCheckingError",
            SelfHealEvent::PodRestorationFailed { .. } => "PodRestorationError",
            SelfHealEvent::PodRestorationPending { .. } => "ConfirmPodRestorationErr",
            SelfHealEvent::StatusPersistFailed { .. } => "StatusPersistFailed",
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            SelfHealEvent::PvcResizeRequested { .. }
            | SelfHealEvent::PodsDeletedForDrift { .. }
            | SelfHealEvent::PvcRegenerating { .. }
            | SelfHealEvent::PruningCandidateFound { .. }
            | SelfHealEvent::PruningComplete { .. }
            | SelfHealEvent::PodRestored { .. } => EventSeverity::Info,
            _ => EventSeverity::Warning,
        }
    }
}

impl fmt::Display for SelfHealEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelfHealEvent::PvcResizeRequested { volumes } => write!(
                f,
                "PVC auto scaling requested disk expansion for {}",
                volumes.join(", ")
            ),
            SelfHealEvent::PvcUsageCollectionFailed => {
                write!(f, "failed to collect pvc disk usage")
            }
            SelfHealEvent::PvcResizeSignalFailed { reason } => {
                write!(f, "failed to signal pvc resize: {}", reason)
            }
            SelfHealEvent::PodsDeletedForDrift {
                threshold_height,
                retention_time,
                deleted,
            } => {
                write!(
                    f,
                    "Height lagged behind by {} or more blocks",
                    threshold_height
                )?;
                if let Some(retention) = retention_time {
                    write!(f, " or stayed flat for at least {:?}", retention)?;
                }
                write!(f, "; deleted {} pod(s)", deleted)
            }
            SelfHealEvent::DriftPodDeleteFailed { pod, reason } => {
                write!(f, "failed to delete pod {}: {}", pod, reason)
            }
            SelfHealEvent::PvcRegenerating { pod, window } => write!(
                f,
                "Pod {} exceeded its failure threshold within {:?}. Re-generating PVC...",
                pod, window
            ),
            SelfHealEvent::PvcRegenerationFailed { pod, reason } => {
                write!(f, "failed to regenerate pvc for pod {}: {}", pod, reason)
            }
            SelfHealEvent::PruningUsageCollectionFailed => {
                write!(f, "failed to collect pvc disk usage")
            }
            SelfHealEvent::PruningCandidateFound { pod } => {
                write!(f, "Pruning candidate found: {}", pod)
            }
            SelfHealEvent::PodReplacementPending { reason } => {
                write!(f, "waiting for pod replacement: {}", reason)
            }
            SelfHealEvent::PruningPhaseReset { from, reason } => write!(
                f,
                "pruning reset from {} to {}: {}",
                from,
                PruningPhase::FindingCandidate,
                reason
            ),
            SelfHealEvent::PruningCheckFailed { reason } => {
                write!(f, "failed to check pruning status: {}", reason)
            }
            SelfHealEvent::PruningComplete { pods } => {
                write!(f, "Pruning complete for {}", pods.join(", "))
            }
            SelfHealEvent::PodRestorationFailed { reason } => {
                write!(f, "failed to restore pod: {}", reason)
            }
            SelfHealEvent::PodRestorationPending { reason } => {
                write!(f, "failed to confirm pod restoration: {}", reason)
            }
            SelfHealEvent::PodRestored { pods } => {
                write!(f, "Pod restored after pruning: {}", pods.join(", "))
            }
            SelfHealEvent::StatusPersistFailed { reason } => {
                write!(f, "failed to persist status: {}", reason)
            }
        }
    }
}
