//! Sliding-window failure counting for PVC regeneration.
//!
//! Each drift deletion of a pod is recorded as a failure. A pod that keeps
//! getting deleted within a short window most likely has a corrupt data
//! volume, so once the count reaches the threshold its PVC is regenerated.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nodeheal_types::{RegenPvcPhase, RegenPvcState, RegeneratePvcSpec};
use tracing::debug;

/// Counts failures inside a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureWindowTracker {
    window: Duration,
    threshold: u32,
}

impl FailureWindowTracker {
    pub fn new(window: Duration, threshold: u32) -> Self {
        Self { window, threshold }
    }

    pub fn from_spec(spec: &RegeneratePvcSpec) -> Self {
        Self::new(spec.failed_count_collection_duration, spec.threshold_count)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a failure at `now`.
    ///
    /// Entries older than `now - window` are dropped and `now` is appended.
    /// When the resulting count reaches the threshold the log is cleared,
    /// the phase moves to `Regenerating` and `true` is returned. The next
    /// failure after a clear starts a fresh log in `NotYet`.
    pub fn record_failure(&self, state: &mut RegenPvcState, now: DateTime<Utc>) -> bool {
        if state.failure_times.is_empty() {
            state.phase = RegenPvcPhase::NotYet;
        }

        let window = self.window;
        state.failure_times.retain(|at| {
            now.signed_duration_since(*at)
                .to_std()
                .map(|age| age <= window)
                .unwrap_or(true)
        });
        state.failure_times.push(now);

        let count = state.failure_times.len();
        let exceeded = count >= self.threshold as usize;
        if exceeded {
            state.phase = RegenPvcPhase::Regenerating;
            state.failure_times.clear();
        }

        debug!(
            count = count,
            threshold = self.threshold,
            exceeded = exceeded,
            "Recorded pod failure"
        );
        exceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    fn tracker() -> FailureWindowTracker {
        FailureWindowTracker::new(Duration::from_secs(300), 3)
    }

    #[test]
    fn test_triggers_on_third_failure_in_window() {
        let tracker = tracker();
        let start = Utc::now();
        let mut state = RegenPvcState::default();

        assert!(!tracker.record_failure(&mut state, start));
        assert!(!tracker.record_failure(&mut state, start + minutes(1)));
        assert!(tracker.record_failure(&mut state, start + minutes(2)));

        assert!(state.failure_times.is_empty());
        assert_eq!(state.phase, RegenPvcPhase::Regenerating);
    }

    #[test]
    fn test_does_not_retrigger_after_clear() {
        let tracker = tracker();
        let start = Utc::now();
        let mut state = RegenPvcState::default();
        for i in 0..3 {
            tracker.record_failure(&mut state, start + minutes(i));
        }

        assert!(!tracker.record_failure(&mut state, start + minutes(3)));
        assert_eq!(state.phase, RegenPvcPhase::NotYet);
        assert_eq!(state.failure_times.len(), 1);
        assert!(!tracker.record_failure(&mut state, start + minutes(4)));
        assert!(tracker.record_failure(&mut state, start + minutes(5)));
    }

    #[test]
    fn test_old_entries_are_excluded() {
        let tracker = tracker();
        let start = Utc::now();
        let mut state = RegenPvcState::default();

        assert!(!tracker.record_failure(&mut state, start));
        assert!(!tracker.record_failure(&mut state, start + minutes(1)));
        // Both earlier failures are older than five minutes by now.
        assert!(!tracker.record_failure(&mut state, start + minutes(7)));
        assert_eq!(state.failure_times, vec![start + minutes(7)]);
    }

    #[test]
    fn test_entry_exactly_at_window_edge_counts() {
        let tracker = tracker();
        let start = Utc::now();
        let mut state = RegenPvcState::default();

        tracker.record_failure(&mut state, start);
        tracker.record_failure(&mut state, start + minutes(1));
        assert!(tracker.record_failure(&mut state, start + minutes(5)));
    }

    #[test]
    fn test_zero_threshold_fires_every_time() {
        let tracker = FailureWindowTracker::new(Duration::from_secs(60), 0);
        let mut state = RegenPvcState::default();
        assert!(tracker.record_failure(&mut state, Utc::now()));
        assert!(tracker.record_failure(&mut state, Utc::now()));
    }
}
