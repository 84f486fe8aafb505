//! Shared fakes for the control integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nodeheal_control::{
    Collaborators, ControlError, ControlResult, ControllerConfig, EventReporter,
    InMemoryResourceStore, Orchestrator, PodGateway, ResourceStore, VolumeClaim,
};
use nodeheal_health::{DiskUsageProvider, HealthResult, PvcDiskUsage, StatusCollector, StatusItem};
use nodeheal_types::{FullNode, FullNodeSpec, FullNodeStatus, Pod, ResourceKey, SelfHealSpec};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fleet of pods whose observations tests can edit between cycles.
pub struct Fleet {
    pub items: Mutex<Vec<StatusItem>>,
    pub usage: Mutex<Vec<PvcDiskUsage>>,
    pub pods: Mutex<Vec<Pod>>,
    pub claims: Mutex<BTreeSet<String>>,
    pub deleted_pods: Mutex<Vec<String>>,
    pub deleted_claims: Mutex<Vec<String>>,

    /// How long disk usage collection takes.
    pub usage_delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Fleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Vec::new()),
            usage: Mutex::new(Vec::new()),
            pods: Mutex::new(Vec::new()),
            claims: Mutex::new(BTreeSet::new()),
            deleted_pods: Mutex::new(Vec::new()),
            deleted_claims: Mutex::new(Vec::new()),
            usage_delay: Mutex::new(Duration::ZERO),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    /// Highest number of usage collections seen running at once.
    pub fn max_concurrent_collections(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn set_pods(&self, pods: Vec<Pod>) {
        *self.pods.lock().unwrap() = pods;
    }

    pub fn set_usage(&self, usage: Vec<(&str, u32)>) {
        *self.usage.lock().unwrap() = usage
            .into_iter()
            .map(|(name, percent_used)| PvcDiskUsage {
                name: name.to_string(),
                percent_used,
                capacity: "100Gi".parse().unwrap(),
            })
            .collect();
    }

    pub fn set_synced(&self, pods: &[(Pod, u64)]) {
        let now = Utc::now();
        *self.items.lock().unwrap() = pods
            .iter()
            .map(|(pod, height)| StatusItem::synced(pod.clone(), *height, now))
            .collect();
    }
}

#[async_trait]
impl StatusCollector for Fleet {
    async fn collect(&self, _resource: &FullNode) -> Vec<StatusItem> {
        self.items.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiskUsageProvider for Fleet {
    async fn collect_disk_usage(&self, _resource: &FullNode) -> HealthResult<Vec<PvcDiskUsage>> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        let delay = *self.usage_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(self.usage.lock().unwrap().clone())
    }
}

#[async_trait]
impl PodGateway for Fleet {
    async fn list_pods(&self, _resource: &FullNode) -> ControlResult<Vec<Pod>> {
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn delete_pod(&self, pod: &Pod) -> ControlResult<()> {
        let mut pods = self.pods.lock().unwrap();
        let before = pods.len();
        pods.retain(|p| p.name != pod.name);
        self.deleted_pods.lock().unwrap().push(pod.name.clone());
        if pods.len() == before {
            return Err(ControlError::NotFound {
                kind: "pod",
                name: pod.name.clone(),
            });
        }
        Ok(())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> ControlResult<Option<VolumeClaim>> {
        Ok(self
            .claims
            .lock()
            .unwrap()
            .contains(name)
            .then(|| VolumeClaim {
                name: name.to_string(),
                namespace: namespace.to_string(),
                capacity: Some("100Gi".parse().unwrap()),
            }))
    }

    async fn delete_pvc(&self, claim: &VolumeClaim) -> ControlResult<()> {
        self.claims.lock().unwrap().remove(&claim.name);
        self.deleted_claims.lock().unwrap().push(claim.name.clone());
        Ok(())
    }
}

/// Edits the spec right before the first status write of each cycle, as an
/// operator racing the controller would.
pub struct RacingStore {
    pub inner: InMemoryResourceStore,
    pub races: AtomicU32,
}

impl RacingStore {
    pub fn new(races: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryResourceStore::new(),
            races: AtomicU32::new(races),
        })
    }
}

#[async_trait]
impl ResourceStore for RacingStore {
    async fn get(&self, key: &ResourceKey) -> ControlResult<Option<FullNode>> {
        self.inner.get(key).await
    }

    async fn list_keys(&self) -> ControlResult<Vec<ResourceKey>> {
        self.inner.list_keys().await
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: u64,
        status: FullNodeStatus,
    ) -> ControlResult<FullNode> {
        if self.races.load(Ordering::SeqCst) > 0 {
            self.races.fetch_sub(1, Ordering::SeqCst);
            if let Some(current) = self.inner.snapshot(key) {
                let mut spec = current.spec.clone();
                spec.replicas += 1;
                self.inner.update_spec(key, spec)?;
            }
        }
        self.inner.update_status(key, resource_version, status).await
    }
}

pub fn resource(name: &str, self_heal: SelfHealSpec) -> FullNode {
    FullNode::new(
        ResourceKey::new("default", name),
        FullNodeSpec {
            replicas: 3,
            rollout_strategy: Default::default(),
            self_heal: Some(self_heal),
        },
    )
}

pub fn pod(name: &str, ordinal: u32) -> Pod {
    Pod::new(name, "default", ordinal, format!("pvc-{}", name))
        .with_ready_since(Utc::now() - chrono::Duration::minutes(10))
}

pub fn orchestrator(fleet: &Arc<Fleet>, store: Arc<dyn ResourceStore>) -> Orchestrator {
    Orchestrator::new(
        Collaborators {
            store,
            statuses: fleet.clone(),
            usage: fleet.clone(),
            pods: fleet.clone(),
        },
        ControllerConfig::default(),
        EventReporter::default(),
    )
}
