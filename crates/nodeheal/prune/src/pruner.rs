//! Pruning candidate selection.

use std::sync::Arc;
use std::time::Duration;

use nodeheal_health::PvcDiskUsage;
use nodeheal_types::{FullNode, Pod, PruningSpec};
use tracing::{debug, info};

use crate::collector::CandidateCollector;
use crate::error::{PruneError, PruneResult};

/// Default ceiling on candidate discovery.
pub const DEFAULT_CANDIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Picks the pod to prune next.
pub struct Pruner {
    collector: Arc<dyn CandidateCollector>,
    timeout: Duration,
}

impl Pruner {
    pub fn new(collector: Arc<dyn CandidateCollector>) -> Self {
        Self {
            collector,
            timeout: DEFAULT_CANDIDATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Select the synced pod with the highest disk usage at or above the trigger.
    ///
    /// Ties go to the pod whose volume appears first in `usage`. Nothing is
    /// selected unless at least `min_available` synced pods would remain.
    pub async fn find_candidate(
        &self,
        resource: &FullNode,
        spec: &PruningSpec,
        usage: &[PvcDiskUsage],
    ) -> PruneResult<Option<Pod>> {
        let synced = tokio::time::timeout(self.timeout, self.collector.synced_pods(resource))
            .await
            .map_err(|_| PruneError::Timeout {
                operation: "collect synced pods".into(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?;

        if synced.is_empty() {
            debug!(resource = %resource.key, "No synced pods to prune");
            return Ok(None);
        }

        let remaining = synced.len() - 1;
        if remaining < spec.min_available() as usize {
            debug!(
                resource = %resource.key,
                synced = synced.len(),
                min_available = spec.min_available(),
                "Too few synced pods to take one out for pruning"
            );
            return Ok(None);
        }

        let mut best: Option<(&PvcDiskUsage, &Pod)> = None;
        for volume in usage {
            if volume.percent_used < spec.used_space_percentage {
                continue;
            }
            let Some(pod) = synced.iter().find(|pod| pod.volume_claim == volume.name) else {
                continue;
            };
            match best {
                Some((current, _)) if current.percent_used >= volume.percent_used => {}
                _ => best = Some((volume, pod)),
            }
        }

        Ok(best.map(|(volume, pod)| {
            info!(
                resource = %resource.key,
                pod = %pod.name,
                used = volume.percent_used,
                "Selected pruning candidate"
            );
            pod.clone()
        }))
    }
}
