//! Collaborators that observe a running fleet.
//!
//! Both collectors are implemented outside this crate (an RPC client against
//! each node, a disk-usage sidecar). The evaluators only see their results.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeheal_types::{FullNode, Pod, Quantity};

use crate::error::HealthResult;

/// One pod's reported sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusItem {
    pub pod: Pod,

    /// Latest block height, when the node answered.
    pub height: Option<u64>,

    /// `true` when the node reports it is not catching up.
    pub in_sync: Option<bool>,

    /// Why the node could not be queried.
    pub error: Option<String>,

    pub observed_at: DateTime<Utc>,
}

impl StatusItem {
    pub fn synced(pod: Pod, height: u64, observed_at: DateTime<Utc>) -> Self {
        Self {
            pod,
            height: Some(height),
            in_sync: Some(true),
            error: None,
            observed_at,
        }
    }

    pub fn failed(pod: Pod, error: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            pod,
            height: None,
            in_sync: None,
            error: Some(error.into()),
            observed_at,
        }
    }

    /// A pod is synced when it answered, is not catching up and reports a height.
    pub fn is_synced(&self) -> bool {
        self.error.is_none() && self.in_sync == Some(true) && self.height.is_some()
    }
}

/// Helpers over a collected status snapshot.
pub trait StatusCollection {
    fn synced(&self) -> Vec<&StatusItem>;

    fn synced_pods(&self) -> Vec<Pod> {
        self.synced().into_iter().map(|item| item.pod.clone()).collect()
    }
}

impl StatusCollection for [StatusItem] {
    fn synced(&self) -> Vec<&StatusItem> {
        self.iter().filter(|item| item.is_synced()).collect()
    }
}

/// Disk usage of one PVC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvcDiskUsage {
    /// PVC name.
    pub name: String,

    /// Used space, 0-100.
    pub percent_used: u32,

    /// Current capacity.
    pub capacity: Quantity,
}

/// Queries every pod of a resource for its sync state.
///
/// Per-pod failures are reported on the item; the call itself never fails.
#[async_trait]
pub trait StatusCollector: Send + Sync {
    async fn collect(&self, resource: &FullNode) -> Vec<StatusItem>;
}

/// Reports PVC disk usage for a resource. Fails as a whole.
#[async_trait]
pub trait DiskUsageProvider: Send + Sync {
    async fn collect_disk_usage(&self, resource: &FullNode) -> HealthResult<Vec<PvcDiskUsage>>;
}

#[async_trait]
impl<T: StatusCollector + ?Sized> StatusCollector for Arc<T> {
    async fn collect(&self, resource: &FullNode) -> Vec<StatusItem> {
        (**self).collect(resource).await
    }
}

#[async_trait]
impl<T: DiskUsageProvider + ?Sized> DiskUsageProvider for Arc<T> {
    async fn collect_disk_usage(&self, resource: &FullNode) -> HealthResult<Vec<PvcDiskUsage>> {
        (**self).collect_disk_usage(resource).await
    }
}
