//! The five-phase pruning cycle.
//!
//! Each call to [`PruningStateMachine::step`] looks at the phase recorded in
//! status, performs at most one transition and buffers the resulting status
//! changes. Nothing is retried in place: a failed check simply leaves the
//! phase unchanged and asks to be called again after a delay.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodeheal_health::{DiskUsageProvider, StatusOp, StatusPatch};
use nodeheal_types::{FullNode, PruningPhase, PruningSpec, SelfHealEvent};
use tracing::{debug, info, instrument, warn};

use crate::collector::{CandidateCollector, PodLister};
use crate::control::FullNodeControl;
use crate::error::{PruneError, PruneResult};
use crate::pruner::Pruner;

/// Timing of the pruning cycle.
#[derive(Debug, Clone)]
pub struct PruningConfig {
    /// Delay after a transition or a transient failure.
    pub retry_delay: Duration,

    /// Delay while a pruning job is still running.
    pub complete_poll_delay: Duration,

    /// Ceiling on candidate discovery.
    pub candidate_timeout: Duration,

    /// Ceiling on disk usage collection and pod listing.
    pub io_timeout: Duration,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(10),
            complete_poll_delay: Duration::from_secs(30),
            candidate_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
        }
    }
}

/// What one step did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Phase recorded in status when the step started.
    pub phase: PruningPhase,

    /// When the machine wants to run again.
    pub requeue_after: Duration,

    /// Audit events to record for the resource.
    pub events: Vec<SelfHealEvent>,

    /// A transient failure to report for this cycle.
    pub error: Option<PruneError>,
}

impl StepOutcome {
    fn new(phase: PruningPhase, requeue_after: Duration) -> Self {
        Self {
            phase,
            requeue_after,
            events: Vec::new(),
            error: None,
        }
    }

    fn event(mut self, event: SelfHealEvent) -> Self {
        self.events.push(event);
        self
    }

    fn failed(mut self, error: PruneError) -> Self {
        self.error = Some(error);
        self
    }
}

pub struct PruningStateMachine {
    usage: Arc<dyn DiskUsageProvider>,
    pruner: Pruner,
    control: FullNodeControl,
    config: PruningConfig,
}

impl PruningStateMachine {
    pub fn new(
        usage: Arc<dyn DiskUsageProvider>,
        candidates: Arc<dyn CandidateCollector>,
        lister: Arc<dyn PodLister>,
        config: PruningConfig,
    ) -> Self {
        Self {
            usage,
            pruner: Pruner::new(candidates).with_timeout(config.candidate_timeout),
            control: FullNodeControl::new(lister).with_timeout(config.io_timeout),
            config,
        }
    }

    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    /// Advance the cycle by at most one phase.
    #[instrument(skip(self, resource, spec, patch), fields(resource = %resource.key))]
    pub async fn step(
        &self,
        resource: &FullNode,
        spec: &PruningSpec,
        patch: &mut StatusPatch,
        now: DateTime<Utc>,
    ) -> StepOutcome {
        let phase = match resource.status.self_healing.pruning.as_ref() {
            Some(status) => status.phase,
            None => {
                patch.push(StatusOp::SetPruningPhase(PruningPhase::FindingCandidate));
                PruningPhase::FindingCandidate
            }
        };
        let retry = StepOutcome::new(phase, self.config.retry_delay);

        match phase {
            PruningPhase::FindingCandidate => self.find_candidate(resource, spec, patch, now, retry).await,

            PruningPhase::WaitingForPodReplaced => {
                match self.control.confirm_pod_replaced(resource).await {
                    Ok(()) => {
                        info!("Candidate pod replaced by its pruning variant");
                        self.advance(patch, PruningPhase::WaitingForComplete);
                        retry
                    }
                    Err(err) => self.handle_error(phase, err, patch, retry, |reason| {
                        SelfHealEvent::PodReplacementPending { reason }
                    }),
                }
            }

            PruningPhase::WaitingForComplete => {
                match self.control.check_pruning_complete(resource).await {
                    Ok(true) => {
                        let pods = candidate_pods(resource);
                        info!(pods = ?pods, "Pruning complete");
                        self.advance(patch, PruningPhase::RestoringPod);
                        retry.event(SelfHealEvent::PruningComplete { pods })
                    }
                    Ok(false) => {
                        debug!("Pruning is not complete");
                        StepOutcome::new(phase, self.config.complete_poll_delay)
                    }
                    Err(err) => self.handle_error(phase, err, patch, retry, |reason| {
                        SelfHealEvent::PruningCheckFailed { reason }
                    }),
                }
            }

            PruningPhase::RestoringPod => {
                match self.control.signal_pod_restoration(resource, patch) {
                    Ok(()) => {
                        info!("Signalled pod restoration");
                        self.advance(patch, PruningPhase::ConfirmPodRestoration);
                        retry
                    }
                    Err(err) => self.handle_error(phase, err, patch, retry, |reason| {
                        SelfHealEvent::PodRestorationFailed { reason }
                    }),
                }
            }

            PruningPhase::ConfirmPodRestoration => {
                match self.control.confirm_pod_restoration(resource).await {
                    Ok(()) => {
                        let pods = candidate_pods(resource);
                        info!(pods = ?pods, "Pods restored, pruning cycle finished");
                        patch.push(StatusOp::ClearPruningCandidates);
                        self.advance(patch, PruningPhase::FindingCandidate);
                        retry.event(SelfHealEvent::PodRestored { pods })
                    }
                    Err(err) => self.handle_error(phase, err, patch, retry, |reason| {
                        SelfHealEvent::PodRestorationPending { reason }
                    }),
                }
            }
        }
    }

    async fn find_candidate(
        &self,
        resource: &FullNode,
        spec: &PruningSpec,
        patch: &mut StatusPatch,
        now: DateTime<Utc>,
        retry: StepOutcome,
    ) -> StepOutcome {
        let usage = match self.collect_usage(resource).await {
            Ok(usage) => usage,
            Err(err) => {
                warn!(error = %err, "Failed to collect pvc disk usage");
                return retry
                    .event(SelfHealEvent::PruningUsageCollectionFailed)
                    .failed(err);
            }
        };

        let candidate = match self.pruner.find_candidate(resource, spec, &usage).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return retry,
            Err(err) => {
                warn!(error = %err, "Failed to find pruning candidate");
                return retry.failed(err);
            }
        };

        info!(pod = %candidate.name, "Pruning candidate found");
        self.control.signal_pod_replace(&candidate, now, patch);
        self.advance(patch, PruningPhase::WaitingForPodReplaced);
        retry.event(SelfHealEvent::PruningCandidateFound {
            pod: candidate.name,
        })
    }

    async fn collect_usage(&self, resource: &FullNode) -> PruneResult<Vec<nodeheal_health::PvcDiskUsage>> {
        tokio::time::timeout(self.config.io_timeout, self.usage.collect_disk_usage(resource))
            .await
            .map_err(|_| PruneError::Timeout {
                operation: "collect disk usage".into(),
                timeout_ms: self.config.io_timeout.as_millis() as u64,
            })?
            .map_err(|err| PruneError::CollectUsage(err.to_string()))
    }

    fn advance(&self, patch: &mut StatusPatch, to: PruningPhase) {
        patch.push(StatusOp::SetPruningPhase(to));
    }

    /// `NoCandidates` restarts the cycle, a pending pod is waited on and
    /// anything else is reported as a transient failure.
    fn handle_error(
        &self,
        phase: PruningPhase,
        err: PruneError,
        patch: &mut StatusPatch,
        retry: StepOutcome,
        event: impl FnOnce(String) -> SelfHealEvent,
    ) -> StepOutcome {
        if err == PruneError::NoCandidates {
            warn!(from = %phase, "No pruning candidates registered, restarting cycle");
            patch.push(StatusOp::ClearPruningCandidates);
            self.advance(patch, PruningPhase::FindingCandidate);
            return retry.event(SelfHealEvent::PruningPhaseReset {
                from: phase,
                reason: err.to_string(),
            });
        }

        if err.is_pending() {
            debug!(error = %err, "Waiting on pod builder");
            return retry.event(event(err.to_string()));
        }

        warn!(error = %err, phase = %phase, "Pruning step failed");
        retry.event(event(err.to_string())).failed(err)
    }
}

fn candidate_pods(resource: &FullNode) -> Vec<String> {
    resource
        .status
        .self_healing
        .pruning
        .as_ref()
        .map(|status| {
            status
                .candidates
                .values()
                .map(|c| c.pod_name.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodeheal_health::{HealthError, HealthResult, PvcDiskUsage};
    use nodeheal_types::{
        ContainerState, FullNodeSpec, Pod, PruningStatus, Quantity, ResourceKey,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct Fleet {
        pods: Mutex<Vec<Pod>>,
        usage: Mutex<Option<Vec<PvcDiskUsage>>>,
    }

    #[async_trait]
    impl DiskUsageProvider for Fleet {
        async fn collect_disk_usage(&self, _resource: &FullNode) -> HealthResult<Vec<PvcDiskUsage>> {
            self.usage
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| HealthError::CollectionFailed("sidecar unreachable".into()))
        }
    }

    #[async_trait]
    impl CandidateCollector for Fleet {
        async fn synced_pods(&self, _resource: &FullNode) -> Vec<Pod> {
            self.pods
                .lock()
                .unwrap()
                .iter()
                .filter(|p| !p.is_pruner())
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl PodLister for Fleet {
        async fn list_pods(&self, _resource: &FullNode) -> PruneResult<Vec<Pod>> {
            Ok(self.pods.lock().unwrap().clone())
        }
    }

    fn machine(fleet: &Arc<Fleet>) -> PruningStateMachine {
        PruningStateMachine::new(
            fleet.clone(),
            fleet.clone(),
            fleet.clone(),
            PruningConfig::default(),
        )
    }

    fn resource() -> FullNode {
        FullNode::new(
            ResourceKey::new("default", "akash"),
            FullNodeSpec {
                replicas: 3,
                rollout_strategy: Default::default(),
                self_heal: None,
            },
        )
    }

    fn pods() -> Vec<Pod> {
        (0..3)
            .map(|i| Pod::new(format!("akash-{i}"), "default", i, format!("pvc-akash-{i}")))
            .collect()
    }

    fn with_phase(phase: PruningPhase) -> FullNode {
        let mut resource = resource();
        resource.status.self_healing.pruning = Some(PruningStatus {
            phase,
            ..Default::default()
        });
        resource
    }

    #[tokio::test]
    async fn test_first_step_initializes_status() {
        let fleet = Arc::new(Fleet::default());
        *fleet.usage.lock().unwrap() = Some(Vec::new());
        *fleet.pods.lock().unwrap() = pods();

        let mut patch = StatusPatch::new();
        let outcome = machine(&fleet)
            .step(&resource(), &PruningSpec::new(80), &mut patch, Utc::now())
            .await;

        assert_eq!(outcome.phase, PruningPhase::FindingCandidate);
        assert_eq!(outcome.requeue_after, Duration::from_secs(10));
        assert!(outcome.error.is_none());
        assert_eq!(
            patch.ops(),
            &[StatusOp::SetPruningPhase(PruningPhase::FindingCandidate)]
        );
    }

    #[tokio::test]
    async fn test_usage_failure_is_transient() {
        let fleet = Arc::new(Fleet::default());
        *fleet.pods.lock().unwrap() = pods();

        let resource = with_phase(PruningPhase::FindingCandidate);
        let mut patch = StatusPatch::new();
        let outcome = machine(&fleet)
            .step(&resource, &PruningSpec::new(80), &mut patch, Utc::now())
            .await;

        assert!(patch.is_empty());
        assert!(matches!(outcome.error, Some(PruneError::CollectUsage(_))));
        assert_eq!(outcome.events, vec![SelfHealEvent::PruningUsageCollectionFailed]);
    }

    #[tokio::test]
    async fn test_missing_candidates_reset_the_cycle() {
        let fleet = Arc::new(Fleet::default());
        *fleet.pods.lock().unwrap() = pods();

        for phase in [
            PruningPhase::WaitingForPodReplaced,
            PruningPhase::WaitingForComplete,
            PruningPhase::RestoringPod,
            PruningPhase::ConfirmPodRestoration,
        ] {
            let resource = with_phase(phase);
            let mut patch = StatusPatch::new();
            let outcome = machine(&fleet)
                .step(&resource, &PruningSpec::new(80), &mut patch, Utc::now())
                .await;

            assert!(outcome.error.is_none(), "phase {phase}");
            assert!(matches!(
                outcome.events.as_slice(),
                [SelfHealEvent::PruningPhaseReset { from, .. }] if *from == phase
            ));

            let mut status = resource.status.clone();
            patch.apply(&mut status);
            let pruning = status.self_healing.pruning.unwrap();
            assert_eq!(pruning.phase, PruningPhase::FindingCandidate);
            assert!(!pruning.has_candidates());
        }
    }

    #[tokio::test]
    async fn test_running_job_polls_slowly() {
        let fleet = Arc::new(Fleet::default());
        let mut resource = resource();
        let mut patch = StatusPatch::new();
        let candidate = Pod::new("akash-1", "default", 1, "pvc-akash-1");
        FullNodeControl::new(fleet.clone()).signal_pod_replace(&candidate, Utc::now(), &mut patch);
        patch.push(StatusOp::SetPruningPhase(PruningPhase::WaitingForComplete));
        patch.apply(&mut resource.status);

        *fleet.pods.lock().unwrap() = vec![Pod::new("akash-1-pruner", "default", 1, "pvc-akash-1")
            .with_container("prune", ContainerState::Running { started_at: Utc::now() })];

        let mut patch = StatusPatch::new();
        let outcome = machine(&fleet)
            .step(&resource, &PruningSpec::new(80), &mut patch, Utc::now())
            .await;
        assert_eq!(outcome.requeue_after, Duration::from_secs(30));
        assert!(patch.is_empty());
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn test_pending_replacement_is_not_an_error() {
        let fleet = Arc::new(Fleet::default());
        *fleet.pods.lock().unwrap() = pods();
        *fleet.usage.lock().unwrap() = Some(vec![PvcDiskUsage {
            name: "pvc-akash-2".into(),
            percent_used: 90,
            capacity: Quantity::parse("1Ti").unwrap(),
        }]);

        let machine = machine(&fleet);
        let mut resource = with_phase(PruningPhase::FindingCandidate);
        let mut patch = StatusPatch::new();
        machine
            .step(&resource, &PruningSpec::new(80), &mut patch, Utc::now())
            .await;
        patch.apply(&mut resource.status);

        // The pod builder has not replaced akash-2 yet.
        let mut patch = StatusPatch::new();
        let outcome = machine
            .step(&resource, &PruningSpec::new(80), &mut patch, Utc::now())
            .await;
        assert_eq!(outcome.phase, PruningPhase::WaitingForPodReplaced);
        assert!(outcome.error.is_none());
        assert!(patch.is_empty());
        assert_eq!(outcome.events[0].reason(), "PVCPruning");
    }
}
