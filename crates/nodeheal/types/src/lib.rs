//! nodeheal Types - Core types for full-node self-healing
//!
//! A fleet of blockchain full nodes is described by a single [`FullNode`]
//! resource. The spec is owned by the operator; the status block is owned
//! exclusively by the self-healing controller and is the only place its
//! decisions are persisted.
//!
//! ## Key Concepts
//!
//! - **FullNode**: Fleet descriptor with replicas, rollout strategy and self-heal specs
//! - **Quantity**: Storage sizes such as `100Gi` or `0.5Gi`
//! - **SelfHealingStatus**: PVC resize requests, failure logs and pruning bookkeeping
//! - **Pod**: The slice of a running pod the controller needs to observe
//! - **Events**: Human-readable audit trail of every action taken

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod events;
pub mod ids;
pub mod intstr;
pub mod pod;
pub mod quantity;
pub mod resource;
pub mod status;

pub use error::{ErrorList, QuantityError};
pub use events::{EventSeverity, SelfHealEvent, SelfHealEventEnvelope};
pub use ids::{candidate_key, ResourceKey};
pub use intstr::IntOrPercent;
pub use pod::{pruner_pod_name, ContainerState, ContainerStatus, Pod, PRUNER_POD_SUFFIX};
pub use quantity::{Quantity, QuantityFormat};
pub use resource::{
    DbBackend, FullNode, FullNodeSpec, HeightDriftMitigationSpec, PruningSpec, PvcAutoScaleSpec,
    RegeneratePvcSpec, RolloutStrategy, SelfHealSpec,
};
pub use status::{
    FullNodeStatus, PruningCandidate, PruningPhase, PruningStatus, PvcAutoScaleStatus,
    RegenPvcPhase, RegenPvcState, SelfHealingStatus, SyncInfoPodStatus,
};
