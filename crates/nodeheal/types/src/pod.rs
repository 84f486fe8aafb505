//! Observed pods.
//!
//! Only the fields the self-healing decisions read are modelled; manifest
//! templating belongs to the pod builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix the pod builder appends when it substitutes a pod with its pruning variant.
pub const PRUNER_POD_SUFFIX: &str = "-pruner";

/// Name of the pruning-variant pod for `pod_name`.
pub fn pruner_pod_name(pod_name: &str) -> String {
    format!("{}{}", pod_name, PRUNER_POD_SUFFIX)
}

/// A pod owned by a full-node resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub namespace: String,

    /// Replica ordinal this pod fills.
    pub ordinal: u32,

    /// Name of the PVC backing the data directory.
    pub volume_claim: String,

    /// When the pod last transitioned to Ready, if it is ready.
    pub ready_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub containers: Vec<ContainerStatus>,
}

impl Pod {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        ordinal: u32,
        volume_claim: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ordinal,
            volume_claim: volume_claim.into(),
            ready_since: None,
            containers: Vec::new(),
        }
    }

    pub fn with_ready_since(mut self, since: DateTime<Utc>) -> Self {
        self.ready_since = Some(since);
        self
    }

    pub fn with_container(mut self, name: impl Into<String>, state: ContainerState) -> Self {
        self.containers.push(ContainerStatus {
            name: name.into(),
            state,
        });
        self
    }

    /// Whether this pod is a pruning variant rather than a plain node pod.
    pub fn is_pruner(&self) -> bool {
        self.name.ends_with(PRUNER_POD_SUFFIX)
    }

    /// True when every container has terminated.
    ///
    /// A pod that reports no container statuses yet is not terminated.
    pub fn all_containers_terminated(&self) -> bool {
        !self.containers.is_empty()
            && self
                .containers
                .iter()
                .all(|c| matches!(c.state, ContainerState::Terminated { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Waiting { reason: Option<String> },
    Running { started_at: DateTime<Utc> },
    Terminated { exit_code: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pruner_name_round_trip() {
        let name = pruner_pod_name("cosmoshub-0");
        assert_eq!(name, "cosmoshub-0-pruner");
        assert!(Pod::new(name, "default", 0, "pvc-cosmoshub-0").is_pruner());
        assert!(!Pod::new("cosmoshub-0", "default", 0, "pvc-cosmoshub-0").is_pruner());
    }

    #[test]
    fn test_all_containers_terminated() {
        let pod = Pod::new("p", "default", 0, "pvc-p");
        assert!(!pod.all_containers_terminated());

        let pod = pod
            .with_container("prune", ContainerState::Terminated { exit_code: 0 })
            .with_container("sidecar", ContainerState::Running { started_at: Utc::now() });
        assert!(!pod.all_containers_terminated());

        let mut pod = pod;
        pod.containers[1].state = ContainerState::Terminated { exit_code: 1 };
        assert!(pod.all_containers_terminated());
    }
}
