//! Pod-observing collaborators used by the pruning cycle.

use async_trait::async_trait;
use nodeheal_health::{StatusCollection, StatusCollector};
use nodeheal_types::{FullNode, Pod};

use crate::error::PruneResult;

/// Reports which pods of a resource are currently synced.
#[async_trait]
pub trait CandidateCollector: Send + Sync {
    async fn synced_pods(&self, resource: &FullNode) -> Vec<Pod>;
}

/// Lists the pods owned by a resource, pruning variants included.
#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list_pods(&self, resource: &FullNode) -> PruneResult<Vec<Pod>>;
}

/// Adapts a [`StatusCollector`] into a [`CandidateCollector`].
pub struct StatusCandidates<C> {
    collector: C,
}

impl<C> StatusCandidates<C> {
    pub fn new(collector: C) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl<C: StatusCollector> CandidateCollector for StatusCandidates<C> {
    async fn synced_pods(&self, resource: &FullNode) -> Vec<Pod> {
        self.collector.collect(resource).await.synced_pods()
    }
}
