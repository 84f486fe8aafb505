//! Block-height drift detection.
//!
//! Two signals select lagging pods. The primary one is height retention: a
//! synced pod whose height has not moved for the configured time, which
//! catches nodes that claim to be in sync while stalled. When it selects
//! nothing, the fallback compares each synced pod against the tallest one.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodeheal_types::{HeightDriftMitigationSpec, Pod, RolloutStrategy, SyncInfoPodStatus};
use tracing::debug;

use crate::collector::{StatusCollection, StatusItem};
use crate::rollout::{available_pods, compute_rollout, RolloutBudgetFn, DEFAULT_MIN_READY};

/// Selects pods lagging behind the fleet, bounded by the disruption budget.
#[derive(Debug, Clone, Copy)]
pub struct DriftDetector {
    compute_rollout: RolloutBudgetFn,
    min_ready: Duration,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_READY)
    }
}

impl DriftDetector {
    pub fn new(min_ready: Duration) -> Self {
        Self {
            compute_rollout,
            min_ready,
        }
    }

    /// Replace the rollout budget function.
    pub fn with_rollout_budget(mut self, compute_rollout: RolloutBudgetFn) -> Self {
        self.compute_rollout = compute_rollout;
        self
    }

    /// Lagging pods in snapshot order, never more than the rollout budget.
    ///
    /// `sync_info` is the sync info derived for this same snapshot.
    pub fn lagging_pods(
        &self,
        items: &[StatusItem],
        sync_info: &BTreeMap<String, SyncInfoPodStatus>,
        spec: &HeightDriftMitigationSpec,
        rollout: &RolloutStrategy,
        desired_replicas: u32,
        now: DateTime<Utc>,
    ) -> Vec<Pod> {
        let synced = items.synced();

        let mut lagging: Vec<Pod> = match spec.retention_threshold() {
            Some(threshold) => synced
                .iter()
                .filter(|item| {
                    sync_info
                        .get(&item.pod.name)
                        .map(|info| info.height_retain_time >= threshold)
                        .unwrap_or(false)
                })
                .map(|item| item.pod.clone())
                .collect(),
            None => Vec::new(),
        };

        if lagging.is_empty() {
            let max_height = synced.iter().filter_map(|item| item.height).max();
            if let Some(max_height) = max_height {
                lagging = synced
                    .iter()
                    .filter(|item| {
                        item.height
                            .map(|h| max_height - h >= spec.threshold_height)
                            .unwrap_or(false)
                    })
                    .map(|item| item.pod.clone())
                    .collect();
            }
        }

        let synced_pods = items.synced_pods();
        let avail = available_pods(&synced_pods, self.min_ready, now);
        let budget = (self.compute_rollout)(
            rollout.max_unavailable.as_ref(),
            desired_replicas,
            avail.len(),
        );

        if lagging.len() > budget {
            debug!(
                lagging = lagging.len(),
                budget = budget,
                "Truncating lagging pods to rollout budget"
            );
            lagging.truncate(budget);
        }
        lagging
    }
}
