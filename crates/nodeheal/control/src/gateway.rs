//! Pod and volume operations against the cluster.

use std::sync::Arc;

use async_trait::async_trait;
use nodeheal_prune::{PodLister, PruneError, PruneResult};
use nodeheal_types::{FullNode, Pod, Quantity};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// A persistent volume claim backing a pod's data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaim {
    pub name: String,
    pub namespace: String,
    pub capacity: Option<Quantity>,
}

/// Mutating access to the pods and volumes of a resource.
///
/// Deleting an object that is already gone reports
/// [`ControlError::NotFound`]; callers decide whether that matters.
#[async_trait]
pub trait PodGateway: Send + Sync {
    /// List the pods owned by `resource`, pruning variants included.
    async fn list_pods(&self, resource: &FullNode) -> ControlResult<Vec<Pod>>;

    async fn delete_pod(&self, pod: &Pod) -> ControlResult<()>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> ControlResult<Option<VolumeClaim>>;

    async fn delete_pvc(&self, claim: &VolumeClaim) -> ControlResult<()>;
}

/// Treat a missing object as success.
pub fn ignore_not_found(result: ControlResult<()>) -> ControlResult<()> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

/// Lets the pruning cycle list pods through a [`PodGateway`].
pub(crate) struct GatewayLister(pub(crate) Arc<dyn PodGateway>);

#[async_trait]
impl PodLister for GatewayLister {
    async fn list_pods(&self, resource: &FullNode) -> PruneResult<Vec<Pod>> {
        self.0
            .list_pods(resource)
            .await
            .map_err(|err| PruneError::ListPods(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_not_found() {
        let missing = Err(ControlError::NotFound {
            kind: "pod",
            name: "stride-0".into(),
        });
        assert!(ignore_not_found(missing).is_ok());

        let failed = Err(ControlError::Gateway("connection refused".into()));
        assert!(matches!(ignore_not_found(failed), Err(ControlError::Gateway(_))));
        assert!(ignore_not_found(Ok(())).is_ok());
    }
}
