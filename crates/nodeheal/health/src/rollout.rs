//! Disruption budget shared with the fleet's restart controller.
//!
//! Drift remediation deletes pods, so it must never take down more pods at
//! once than a rolling restart would.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nodeheal_types::{IntOrPercent, Pod};
use tracing::warn;

/// Minimum time a pod must have been ready to count as available.
pub const DEFAULT_MIN_READY: Duration = Duration::from_secs(5);

/// Signature of the rollout budget function.
pub type RolloutBudgetFn = fn(Option<&IntOrPercent>, u32, usize) -> usize;

/// Number of pods that may be taken down right now.
///
/// `max_unavailable` defaults to 1 and is resolved against `desired`
/// (percentages round down), then clamped to `[1, desired]`. The budget is
/// whatever keeps at least `desired - max_unavailable` pods ready, capped at
/// `max_unavailable`.
pub fn compute_rollout(max_unavailable: Option<&IntOrPercent>, desired: u32, ready: usize) -> usize {
    if desired == 0 {
        return 0;
    }
    let desired = i64::from(desired);

    let unavailable = match max_unavailable {
        Some(value) => value.scaled_value(desired, false).unwrap_or_else(|err| {
            warn!(max_unavailable = %value, error = %err, "Invalid maxUnavailable, using 1");
            1
        }),
        None => 1,
    }
    .clamp(1, desired);

    let min_available = desired - unavailable;
    let ready = i64::try_from(ready).unwrap_or(i64::MAX);
    (ready - min_available).clamp(0, unavailable) as usize
}

/// Pods that have been ready for at least `min_ready` at `now`.
pub fn available_pods(pods: &[Pod], min_ready: Duration, now: DateTime<Utc>) -> Vec<Pod> {
    pods.iter()
        .filter(|pod| match pod.ready_since {
            Some(since) => now
                .signed_duration_since(since)
                .to_std()
                .map(|ready_for| ready_for >= min_ready)
                .unwrap_or(false),
            None => false,
        })
        .cloned()
        .collect()
}
