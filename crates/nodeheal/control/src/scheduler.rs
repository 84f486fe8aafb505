//! Per-resource worker loops.
//!
//! Every managed resource gets one worker that reruns its cycle after the
//! delay the previous cycle asked for. Workers for different resources run
//! in parallel, bounded by a semaphore; cycles for the same resource never
//! overlap, whoever triggers them.

use std::sync::Arc;

use dashmap::DashMap;
use nodeheal_types::ResourceKey;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use crate::context::CycleContext;
use crate::error::ControlError;
use crate::orchestrator::{Orchestrator, ReconcileOutcome};

/// Drives reconciliation cycles for every resource in the store.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    locks: DashMap<ResourceKey, Arc<Mutex<()>>>,
    permits: Arc<Semaphore>,
    workers: DashMap<ResourceKey, JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Arc<Self> {
        let parallelism = orchestrator.config().max_concurrent_resources.max(1);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            orchestrator,
            locks: DashMap::new(),
            permits: Arc::new(Semaphore::new(parallelism)),
            workers: DashMap::new(),
            shutdown_tx,
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run a single cycle for `key`, waiting for any cycle already running for it.
    pub async fn reconcile_once(&self, key: &ResourceKey) -> ReconcileOutcome {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let _guard = lock.lock().await;

        let Ok(_permit) = self.permits.acquire().await else {
            return cancelled();
        };

        let ctx = CycleContext::with_timeout(self.orchestrator.config().cycle_timeout())
            .with_shutdown(self.shutdown_tx.subscribe());
        self.orchestrator.reconcile(key, &ctx).await
    }

    /// Start a worker for `key` unless one is already running.
    pub fn spawn_worker(self: &Arc<Self>, key: ResourceKey) {
        if let Some(handle) = self.workers.get(&key) {
            if !handle.is_finished() {
                return;
            }
        }

        let scheduler = self.clone();
        let worker_key = key.clone();
        let handle = tokio::spawn(async move {
            let key = worker_key;
            let mut shutdown = scheduler.shutdown_tx.subscribe();
            debug!(resource = %key, "Worker started");

            loop {
                if *shutdown.borrow() {
                    break;
                }

                let outcome = scheduler.reconcile_once(&key).await;
                if let Some(errors) = &outcome.error {
                    warn!(
                        resource = %key,
                        errors = errors.len(),
                        error = %errors,
                        "Cycle finished with errors"
                    );
                }

                let Some(delay) = outcome.requeue_after else {
                    break;
                };

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(resource = %key, "Worker stopped");
        });

        self.workers.insert(key, handle);
    }

    /// Discover resources every `discovery_interval` and keep a worker
    /// running for each, until [`shutdown`](Self::shutdown).
    pub async fn run(self: Arc<Self>, discovery_interval: Duration) {
        let mut ticker = interval(discovery_interval);
        let mut shutdown = self.shutdown_tx.subscribe();

        info!("Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.orchestrator.store().list_keys().await {
                        Ok(keys) => {
                            for key in keys {
                                self.spawn_worker(key);
                            }
                        }
                        Err(e) => error!(error = %e, "Resource discovery failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.join_workers().await;
        info!("Scheduler stopped");
    }

    /// Ask every worker and in-flight cycle to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Number of workers that are still running.
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|h| !h.is_finished()).count()
    }

    async fn join_workers(&self) {
        let keys: Vec<ResourceKey> = self.workers.iter().map(|w| w.key().clone()).collect();
        let handles: Vec<JoinHandle<()>> = keys
            .iter()
            .filter_map(|key| self.workers.remove(key).map(|(_, handle)| handle))
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker panicked");
            }
        }
    }
}

fn cancelled() -> ReconcileOutcome {
    let mut errors = nodeheal_types::ErrorList::new();
    errors.push(ControlError::Cancelled {
        operation: "acquire worker permit".to_string(),
    });
    ReconcileOutcome {
        requeue_after: None,
        error: Some(errors),
    }
}
