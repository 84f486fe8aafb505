//! The pod-observing half of the pruning cycle.
//!
//! Each check compares the candidates recorded in status with the pods the
//! resource owns right now. When no candidates are recorded every check
//! returns [`PruneError::NoCandidates`] so the caller can restart the cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodeheal_health::{StatusOp, StatusPatch};
use nodeheal_types::{
    candidate_key, pruner_pod_name, FullNode, Pod, PruningCandidate, PruningStatus,
};
use tracing::debug;

use crate::collector::PodLister;
use crate::error::{PruneError, PruneResult};

/// Default ceiling on a single pod listing.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FullNodeControl {
    lister: Arc<dyn PodLister>,
    timeout: Duration,
}

impl FullNodeControl {
    pub fn new(lister: Arc<dyn PodLister>) -> Self {
        Self {
            lister,
            timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register `pod` as the cycle's candidate and ask the pod builder to
    /// substitute it with its pruning variant.
    pub fn signal_pod_replace(&self, pod: &Pod, now: DateTime<Utc>, patch: &mut StatusPatch) {
        patch.push(StatusOp::AddPruningCandidate {
            key: candidate_key(&pod.name, &pod.namespace),
            candidate: PruningCandidate {
                pod_name: pod.name.clone(),
                namespace: pod.namespace.clone(),
            },
            started_at: now,
        });
    }

    /// `Ok` once no candidate's plain pod exists any more.
    pub async fn confirm_pod_replaced(&self, resource: &FullNode) -> PruneResult<()> {
        let status = candidates_of(resource)?;
        let pods = self.list(resource).await?;

        for candidate in status.candidates.values() {
            if pods.iter().any(|pod| pod.name == candidate.pod_name) {
                return Err(PruneError::NotReplaced(candidate.pod_name.clone()));
            }
        }
        Ok(())
    }

    /// `true` once every candidate's pruning job has finished.
    ///
    /// A pruning pod whose containers have all terminated is finished. A
    /// pruning pod that no longer exists is treated as finished as well.
    pub async fn check_pruning_complete(&self, resource: &FullNode) -> PruneResult<bool> {
        let status = candidates_of(resource)?;
        let pods = self.list(resource).await?;

        for candidate in status.candidates.values() {
            let pruner = pruner_pod_name(&candidate.pod_name);
            match pods.iter().find(|pod| pod.name == pruner) {
                Some(pod) if !pod.all_containers_terminated() => {
                    debug!(pod = %pruner, "Pruning job still running");
                    return Ok(false);
                }
                Some(_) => {}
                None => debug!(pod = %pruner, "Pruning pod absent, treating as finished"),
            }
        }
        Ok(true)
    }

    /// Ask the pod builder to render the normal pod again for every candidate.
    pub fn signal_pod_restoration(
        &self,
        resource: &FullNode,
        patch: &mut StatusPatch,
    ) -> PruneResult<()> {
        let status = candidates_of(resource)?;
        for key in status.candidates.keys() {
            patch.push(StatusOp::ClearPodPruning { key: key.clone() });
        }
        Ok(())
    }

    /// `Ok` once every candidate's plain pod is observed again.
    pub async fn confirm_pod_restoration(&self, resource: &FullNode) -> PruneResult<()> {
        let status = candidates_of(resource)?;
        let pods = self.list(resource).await?;

        for candidate in status.candidates.values() {
            if !pods.iter().any(|pod| pod.name == candidate.pod_name) {
                return Err(PruneError::NotRestored(candidate.pod_name.clone()));
            }
        }
        Ok(())
    }

    async fn list(&self, resource: &FullNode) -> PruneResult<Vec<Pod>> {
        tokio::time::timeout(self.timeout, self.lister.list_pods(resource))
            .await
            .map_err(|_| PruneError::Timeout {
                operation: "list pods".into(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }
}

fn candidates_of(resource: &FullNode) -> PruneResult<&PruningStatus> {
    match resource.status.self_healing.pruning.as_ref() {
        Some(status) if status.has_candidates() => Ok(status),
        _ => Err(PruneError::NoCandidates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodeheal_types::{ContainerState, FullNodeSpec, ResourceKey};
    use std::sync::Mutex;

    struct FakeLister {
        pods: Mutex<PruneResult<Vec<Pod>>>,
    }

    impl FakeLister {
        fn with(pods: Vec<Pod>) -> Arc<Self> {
            Arc::new(Self {
                pods: Mutex::new(Ok(pods)),
            })
        }
    }

    #[async_trait]
    impl PodLister for FakeLister {
        async fn list_pods(&self, _resource: &FullNode) -> PruneResult<Vec<Pod>> {
            self.pods.lock().unwrap().clone()
        }
    }

    fn pod(name: &str, ordinal: u32) -> Pod {
        Pod::new(name, "default", ordinal, format!("pvc-{name}"))
    }

    fn resource_with_candidate(name: &str) -> FullNode {
        let mut resource = FullNode::new(
            ResourceKey::new("default", "juno"),
            FullNodeSpec {
                replicas: 3,
                rollout_strategy: Default::default(),
                self_heal: None,
            },
        );
        let mut patch = StatusPatch::new();
        FullNodeControl::new(FakeLister::with(vec![])).signal_pod_replace(
            &pod(name, 0),
            Utc::now(),
            &mut patch,
        );
        patch.apply(&mut resource.status);
        resource
    }

    #[tokio::test]
    async fn test_no_candidates_everywhere() {
        let mut resource = resource_with_candidate("juno-0");
        resource.status.self_healing.pruning = None;
        let control = FullNodeControl::new(FakeLister::with(vec![pod("juno-0", 0)]));

        assert_eq!(
            control.confirm_pod_replaced(&resource).await,
            Err(PruneError::NoCandidates)
        );
        assert_eq!(
            control.check_pruning_complete(&resource).await,
            Err(PruneError::NoCandidates)
        );
        assert_eq!(
            control.signal_pod_restoration(&resource, &mut StatusPatch::new()),
            Err(PruneError::NoCandidates)
        );
        assert_eq!(
            control.confirm_pod_restoration(&resource).await,
            Err(PruneError::NoCandidates)
        );
    }

    #[tokio::test]
    async fn test_confirm_pod_replaced() {
        let resource = resource_with_candidate("juno-0");

        let control = FullNodeControl::new(FakeLister::with(vec![pod("juno-0", 0), pod("juno-1", 1)]));
        assert_eq!(
            control.confirm_pod_replaced(&resource).await,
            Err(PruneError::NotReplaced("juno-0".into()))
        );

        let control = FullNodeControl::new(FakeLister::with(vec![
            pod("juno-0-pruner", 0),
            pod("juno-1", 1),
        ]));
        assert_eq!(control.confirm_pod_replaced(&resource).await, Ok(()));
    }

    #[tokio::test]
    async fn test_check_pruning_complete() {
        let resource = resource_with_candidate("juno-0");

        let running = pod("juno-0-pruner", 0)
            .with_container("prune", ContainerState::Running { started_at: Utc::now() });
        let control = FullNodeControl::new(FakeLister::with(vec![running]));
        assert_eq!(control.check_pruning_complete(&resource).await, Ok(false));

        let done = pod("juno-0-pruner", 0)
            .with_container("prune", ContainerState::Terminated { exit_code: 0 });
        let control = FullNodeControl::new(FakeLister::with(vec![done]));
        assert_eq!(control.check_pruning_complete(&resource).await, Ok(true));

        let control = FullNodeControl::new(FakeLister::with(vec![pod("juno-1", 1)]));
        assert_eq!(control.check_pruning_complete(&resource).await, Ok(true));
    }

    #[tokio::test]
    async fn test_list_failure_is_propagated() {
        let resource = resource_with_candidate("juno-0");
        let lister = Arc::new(FakeLister {
            pods: Mutex::new(Err(PruneError::ListPods("apiserver unavailable".into()))),
        });
        let control = FullNodeControl::new(lister);
        let err = control.confirm_pod_replaced(&resource).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!err.is_pending());
    }

    #[tokio::test]
    async fn test_restoration() {
        let resource = resource_with_candidate("juno-0");
        let control = FullNodeControl::new(FakeLister::with(vec![pod("juno-0-pruner", 0)]));

        let mut patch = StatusPatch::new();
        control.signal_pod_restoration(&resource, &mut patch).unwrap();
        assert_eq!(
            patch.ops(),
            &[StatusOp::ClearPodPruning {
                key: "default.juno-0".into()
            }]
        );

        assert_eq!(
            control.confirm_pod_restoration(&resource).await,
            Err(PruneError::NotRestored("juno-0".into()))
        );

        let control = FullNodeControl::new(FakeLister::with(vec![pod("juno-0", 0)]));
        assert_eq!(control.confirm_pod_restoration(&resource).await, Ok(()));
    }
}
