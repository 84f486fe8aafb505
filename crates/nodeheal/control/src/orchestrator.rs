//! One reconciliation cycle for a full-node resource.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodeheal_health::{
    derive_sync_info, CapacityPlanner, DiskUsageProvider, DriftDetector, FailureWindowTracker,
    StatusCollector, StatusOp, StatusPatch,
};
use nodeheal_prune::{PruningStateMachine, StatusCandidates};
use nodeheal_types::{
    ErrorList, FullNode, FullNodeStatus, HeightDriftMitigationSpec, Pod, PruningSpec,
    PvcAutoScaleSpec, ResourceKey, SelfHealEvent,
};
use tracing::{debug, info, instrument, warn};

use crate::config::ControllerConfig;
use crate::context::CycleContext;
use crate::error::{ControlError, ControlResult};
use crate::events::EventReporter;
use crate::gateway::{ignore_not_found, GatewayLister, PodGateway};
use crate::store::ResourceStore;
use crate::syncer::{RetryingStatusSyncer, StatusSyncer};

/// External systems the orchestrator observes and acts on.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ResourceStore>,
    pub statuses: Arc<dyn StatusCollector>,
    pub usage: Arc<dyn DiskUsageProvider>,
    pub pods: Arc<dyn PodGateway>,
}

/// Result of one cycle.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// When to run again. `None` means the resource is gone or not self-healing.
    pub requeue_after: Option<Duration>,

    /// Everything that failed this cycle. None of it is fatal.
    pub error: Option<ErrorList<ControlError>>,
}

impl ReconcileOutcome {
    fn stop() -> Self {
        Self {
            requeue_after: None,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Buffered results of the evaluators for one cycle.
struct Cycle {
    patch: StatusPatch,
    errors: ErrorList<ControlError>,
    requeue_after: Duration,
    /// Events announcing status changes; recorded only once the patch is persisted.
    actions: Vec<SelfHealEvent>,
}

impl Cycle {
    fn finish(self) -> ReconcileOutcome {
        ReconcileOutcome {
            requeue_after: Some(self.requeue_after),
            error: self.errors.into_option(),
        }
    }
}

/// Runs pruning, PVC autoscaling and height drift mitigation for a resource.
///
/// Decisions are made against a single snapshot read at the start of the
/// cycle. Status changes are buffered and written once at the end, so a
/// cycle that is cancelled midway leaves status untouched. Events announcing
/// those changes are held back until the write succeeds.
pub struct Orchestrator {
    store: Arc<dyn ResourceStore>,
    statuses: Arc<dyn StatusCollector>,
    usage: Arc<dyn DiskUsageProvider>,
    pods: Arc<dyn PodGateway>,
    pruning: PruningStateMachine,
    planner: CapacityPlanner,
    drift: DriftDetector,
    syncer: Arc<dyn StatusSyncer>,
    reporter: EventReporter,
    config: ControllerConfig,
}

impl Orchestrator {
    pub fn new(collab: Collaborators, config: ControllerConfig, reporter: EventReporter) -> Self {
        let pruning = PruningStateMachine::new(
            collab.usage.clone(),
            Arc::new(StatusCandidates::new(collab.statuses.clone())),
            Arc::new(GatewayLister(collab.pods.clone())),
            config.pruning_config(),
        );
        let syncer = Arc::new(RetryingStatusSyncer::from_config(collab.store.clone(), &config));

        Self {
            store: collab.store,
            statuses: collab.statuses,
            usage: collab.usage,
            pods: collab.pods,
            pruning,
            planner: CapacityPlanner::new(),
            drift: DriftDetector::new(config.min_ready()),
            syncer,
            reporter,
            config,
        }
    }

    /// Replace the status persister.
    pub fn with_syncer(mut self, syncer: Arc<dyn StatusSyncer>) -> Self {
        self.syncer = syncer;
        self
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn reporter(&self) -> &EventReporter {
        &self.reporter
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one cycle for `key`.
    ///
    /// Evaluation order is fixed: pruning, PVC autoscale, then height drift
    /// mitigation with its PVC regeneration check. A failing evaluator is
    /// recorded and the others still run.
    #[instrument(skip(self, ctx), fields(resource = %key))]
    pub async fn reconcile(&self, key: &ResourceKey, ctx: &CycleContext) -> ReconcileOutcome {
        let io = self.config.io_timeout();

        let resource = match ctx.run("get resource", io, self.store.get(key)).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                debug!("Resource not found, nothing to do");
                return ReconcileOutcome::stop();
            }
            Err(err) => {
                warn!(error = %err, "Failed to load resource");
                let mut errors = ErrorList::new();
                errors.push(err);
                return ReconcileOutcome {
                    requeue_after: Some(self.config.requeue_after()),
                    error: Some(errors),
                };
            }
        };

        let Some(self_heal) = resource.spec.self_heal.clone() else {
            debug!("Self-healing not configured");
            return ReconcileOutcome::stop();
        };

        let now = Utc::now();
        let mut cycle = Cycle {
            patch: StatusPatch::new(),
            errors: ErrorList::new(),
            requeue_after: self.config.requeue_after(),
            actions: Vec::new(),
        };

        if let Some(spec) = &self_heal.pruning {
            self.prune(&resource, spec, ctx, &mut cycle, now).await;
        }
        if let Some(spec) = &self_heal.pvc_auto_scale {
            self.autoscale(&resource, spec, ctx, &mut cycle, now).await;
        }
        if let Some(spec) = &self_heal.height_drift_mitigation {
            self.mitigate_drift(&resource, spec, ctx, &mut cycle, now).await;
        }

        if ctx.is_cancelled() {
            warn!(
                ops = cycle.patch.len(),
                actions = cycle.actions.len(),
                "Cycle cancelled, discarding status changes"
            );
            cycle.errors.push(ControlError::Cancelled {
                operation: "reconcile".to_string(),
            });
            return cycle.finish();
        }

        if self.persist(key, ctx, &mut cycle).await {
            for event in cycle.actions.drain(..) {
                self.reporter.record(key, event);
            }
        }
        cycle.finish()
    }

    async fn prune(
        &self,
        resource: &FullNode,
        spec: &PruningSpec,
        ctx: &CycleContext,
        cycle: &mut Cycle,
        now: DateTime<Utc>,
    ) {
        let mut patch = StatusPatch::new();
        let step = ctx
            .within_deadline("pruning step", self.pruning.step(resource, spec, &mut patch, now))
            .await;

        match step {
            Ok(outcome) => {
                cycle.patch.extend(patch);
                for event in outcome.events {
                    self.reporter.record(&resource.key, event);
                }
                if let Some(err) = outcome.error {
                    cycle.errors.push(err.into());
                }
                cycle.requeue_after = cycle.requeue_after.min(outcome.requeue_after);
            }
            Err(err) => {
                warn!(error = %err, "Pruning step aborted");
                cycle.errors.push(err);
                cycle.requeue_after = cycle
                    .requeue_after
                    .min(self.pruning.config().retry_delay);
            }
        }
    }

    async fn autoscale(
        &self,
        resource: &FullNode,
        spec: &PvcAutoScaleSpec,
        ctx: &CycleContext,
        cycle: &mut Cycle,
        now: DateTime<Utc>,
    ) {
        let samples = match ctx
            .run("collect disk usage", self.config.io_timeout(), self.usage.collect_disk_usage(resource))
            .await
        {
            Ok(samples) => samples,
            Err(err) => {
                warn!(error = %err, "Failed to collect disk usage");
                self.reporter
                    .record(&resource.key, SelfHealEvent::PvcUsageCollectionFailed);
                cycle.errors.push(err);
                return;
            }
        };

        let plan = self.planner.evaluate(
            &samples,
            spec,
            &resource.status.self_healing.pvc_auto_scale,
            now,
        );

        if let Some(errors) = plan.error() {
            self.reporter.record(
                &resource.key,
                SelfHealEvent::PvcResizeSignalFailed {
                    reason: errors.to_string(),
                },
            );
            for err in errors.iter() {
                cycle.errors.push(err.clone().into());
            }
        }

        if plan.has_patches() {
            let volumes: Vec<String> = plan.patches.keys().cloned().collect();
            for (volume, request) in plan.patches {
                cycle.patch.push(StatusOp::RequestPvcResize { volume, request });
            }
            cycle
                .actions
                .push(SelfHealEvent::PvcResizeRequested { volumes });
        }
    }

    async fn mitigate_drift(
        &self,
        resource: &FullNode,
        spec: &HeightDriftMitigationSpec,
        ctx: &CycleContext,
        cycle: &mut Cycle,
        now: DateTime<Utc>,
    ) {
        let io = self.config.io_timeout();
        let items = match ctx
            .bound("collect sync status", io, self.statuses.collect(resource))
            .await
        {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "Failed to collect sync status");
                cycle.errors.push(err);
                return;
            }
        };

        let sync_info = derive_sync_info(&items, &resource.status.sync_info);
        let lagging = self.drift.lagging_pods(
            &items,
            &sync_info,
            spec,
            &resource.spec.rollout_strategy,
            resource.spec.replicas,
            now,
        );
        cycle.patch.push(StatusOp::SetSyncInfo(sync_info));

        let tracker = spec.regenerate_pvc.as_ref().map(FailureWindowTracker::from_spec);
        let mut working = resource.status.clone();
        let mut deleted = 0;

        for pod in &lagging {
            let result = ignore_not_found(ctx.run("delete pod", io, self.pods.delete_pod(pod)).await);
            if let Err(err) = result {
                warn!(pod = %pod.name, error = %err, "Failed to delete lagging pod");
                self.reporter.record(
                    &resource.key,
                    SelfHealEvent::DriftPodDeleteFailed {
                        pod: pod.name.clone(),
                        reason: err.to_string(),
                    },
                );
                cycle.errors.push(err);
                continue;
            }

            deleted += 1;
            info!(pod = %pod.name, "Deleted lagging pod");

            if let Some(tracker) = tracker {
                self.record_failure(resource, pod, tracker, &mut working, ctx, cycle, now)
                    .await;
            }
        }

        if deleted > 0 {
            self.reporter.record(
                &resource.key,
                SelfHealEvent::PodsDeletedForDrift {
                    threshold_height: spec.threshold_height,
                    retention_time: spec.retention_threshold(),
                    deleted,
                },
            );
        }
    }

    /// Log a drift deletion and regenerate the pod's PVC once the failure
    /// window fills up.
    ///
    /// `working` tracks the failure logs as this cycle's patch will leave
    /// them, so several deletions in one cycle are counted together.
    #[allow(clippy::too_many_arguments)]
    async fn record_failure(
        &self,
        resource: &FullNode,
        pod: &Pod,
        tracker: FailureWindowTracker,
        working: &mut FullNodeStatus,
        ctx: &CycleContext,
        cycle: &mut Cycle,
        now: DateTime<Utc>,
    ) {
        let op = StatusOp::RecordPodFailure {
            pod: pod.name.clone(),
            at: now,
            tracker,
        };
        let before = working.clone();
        if !op.apply(working) {
            cycle.patch.push(op);
            return;
        }

        match self.regenerate_pvc(pod, ctx).await {
            Ok(()) => {
                info!(pod = %pod.name, pvc = %pod.volume_claim, "Regenerating PVC");
                cycle.patch.push(op);
                cycle.actions.push(SelfHealEvent::PvcRegenerating {
                    pod: pod.name.clone(),
                    window: tracker.window(),
                });
            }
            Err(err) => {
                // Roll back this failure; the older entries still count towards the next trigger.
                *working = before;
                warn!(pod = %pod.name, error = %err, "Failed to regenerate PVC");
                self.reporter.record(
                    &resource.key,
                    SelfHealEvent::PvcRegenerationFailed {
                        pod: pod.name.clone(),
                        reason: err.to_string(),
                    },
                );
                cycle.errors.push(err);
            }
        }
    }

    async fn regenerate_pvc(&self, pod: &Pod, ctx: &CycleContext) -> ControlResult<()> {
        let io = self.config.io_timeout();
        let claim = ctx
            .run("get pvc", io, self.pods.get_pvc(&pod.namespace, &pod.volume_claim))
            .await?;

        match claim {
            Some(claim) => ignore_not_found(ctx.run("delete pvc", io, self.pods.delete_pvc(&claim)).await),
            None => {
                debug!(pvc = %pod.volume_claim, "PVC already gone");
                Ok(())
            }
        }
    }

    /// Write the cycle's patch. Returns whether status now reflects it.
    async fn persist(&self, key: &ResourceKey, ctx: &CycleContext, cycle: &mut Cycle) -> bool {
        if cycle.patch.is_empty() {
            debug!("No status changes");
            return true;
        }

        let result = ctx
            .within_deadline("persist status", self.syncer.sync_update(key, &cycle.patch))
            .await
            .and_then(|result| result);

        if let Err(err) = result {
            warn!(error = %err, "Failed to persist status");
            self.reporter.record(
                key,
                SelfHealEvent::StatusPersistFailed {
                    reason: err.to_string(),
                },
            );
            cycle.errors.push(err);
            return false;
        }
        true
    }
}
