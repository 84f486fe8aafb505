//! PVC capacity autoscaling decisions.
//!
//! The planner never resizes anything itself. It records the requested size
//! in `status.selfHealing.pvcAutoScale`; the fleet controller reads that and
//! expands the claim.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nodeheal_types::{ErrorList, IntOrPercent, PvcAutoScaleSpec, PvcAutoScaleStatus, Quantity};
use tracing::debug;

use crate::collector::PvcDiskUsage;
use crate::error::{HealthError, HealthResult};

/// Resize requests produced by one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResizePlan {
    /// New requests keyed by volume name.
    pub patches: BTreeMap<String, PvcAutoScaleStatus>,

    /// Volumes whose next size could not be computed.
    pub errors: ErrorList<HealthError>,
}

impl ResizePlan {
    pub fn has_patches(&self) -> bool {
        !self.patches.is_empty()
    }

    /// The aggregated error, if any volume failed.
    pub fn error(&self) -> Option<&ErrorList<HealthError>> {
        if self.errors.is_empty() {
            None
        } else {
            Some(&self.errors)
        }
    }
}

/// Turns disk usage samples into PVC resize requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityPlanner;

impl CapacityPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `samples` against `spec` and the requests already in `current`.
    ///
    /// Volumes below the trigger are ignored. A failing volume is recorded in
    /// the plan's errors and does not stop the others.
    pub fn evaluate(
        &self,
        samples: &[PvcDiskUsage],
        spec: &PvcAutoScaleSpec,
        current: &BTreeMap<String, PvcAutoScaleStatus>,
        now: DateTime<Utc>,
    ) -> ResizePlan {
        let mut plan = ResizePlan::default();
        let max_size = spec.max_size.filter(|max| !max.is_zero());

        for sample in samples {
            if sample.percent_used < spec.used_space_percentage {
                continue;
            }

            let mut new_size = match next_capacity(&sample.capacity, &spec.increase_quantity) {
                Ok(size) => size,
                Err(err) => {
                    plan.errors.push(err);
                    continue;
                }
            };

            if let Some(max) = max_size {
                if sample.capacity >= max {
                    debug!(volume = %sample.name, max = %max, "Volume already at max size");
                    continue;
                }
                if new_size >= max {
                    new_size = max;
                }
            }

            if let Some(existing) = current.get(&sample.name) {
                if existing.requested_size == new_size {
                    debug!(volume = %sample.name, size = %new_size, "Resize already requested");
                    continue;
                }
            }

            debug!(
                volume = %sample.name,
                used = sample.percent_used,
                capacity = %sample.capacity,
                requested = %new_size,
                "Requesting PVC resize"
            );
            plan.patches.insert(
                sample.name.clone(),
                PvcAutoScaleStatus {
                    requested_size: new_size,
                    requested_at: now,
                },
            );
        }

        plan
    }
}

/// Next capacity for a volume of size `current`.
///
/// `increase` is tried as a percentage of `current` first (`"20%"`, rounded
/// half away from zero), then as an absolute quantity to add (`"100Gi"`).
/// When both fail the two parse errors are returned together.
pub fn next_capacity(current: &Quantity, increase: &str) -> HealthResult<Quantity> {
    let mut failures = ErrorList::new();

    match IntOrPercent::String(increase.to_string()).scaled_value(100, false) {
        Ok(percent) => {
            let overflow = || HealthError::CapacityOverflow {
                increase: increase.to_string(),
            };
            let addtl = scale_rounded(current.value(), percent).ok_or_else(overflow)?;
            return current
                .value()
                .checked_add(addtl)
                .map(|v| current.with_value(v))
                .ok_or_else(overflow);
        }
        Err(err) => failures.push(err),
    }

    match Quantity::parse(increase) {
        Ok(addtl) => current
            .checked_add(&addtl)
            .ok_or_else(|| HealthError::CapacityOverflow {
                increase: increase.to_string(),
            }),
        Err(err) => {
            failures.push(err);
            Err(HealthError::InvalidIncrease {
                increase: increase.to_string(),
                source: failures,
            })
        }
    }
}

/// `round(value * percent / 100)` with halves rounded away from zero.
fn scale_rounded(value: i64, percent: i64) -> Option<i64> {
    let product = i128::from(value) * i128::from(percent);
    let quotient = product / 100;
    let remainder = product % 100;
    let rounded = if remainder.abs() * 2 >= 100 {
        quotient + product.signum()
    } else {
        quotient
    };
    i64::try_from(rounded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GI: i64 = 1 << 30;

    fn spec(increase: &str) -> PvcAutoScaleSpec {
        PvcAutoScaleSpec {
            used_space_percentage: 80,
            increase_quantity: increase.to_string(),
            max_size: None,
        }
    }

    fn usage(name: &str, percent_used: u32, capacity: &str) -> PvcDiskUsage {
        PvcDiskUsage {
            name: name.to_string(),
            percent_used,
            capacity: Quantity::parse(capacity).unwrap(),
        }
    }

    #[test]
    fn test_next_capacity_percentage() {
        let current = Quantity::parse("100Gi").unwrap();
        let next = next_capacity(&current, "20%").unwrap();
        assert_eq!(next.value(), 120 * GI);
        assert_eq!(next.to_string(), "120Gi");
    }

    #[test]
    fn test_next_capacity_absolute() {
        let current = Quantity::parse("100Gi").unwrap();
        assert_eq!(
            next_capacity(&current, "0.5Gi").unwrap().value(),
            100 * GI + GI / 2
        );
        assert_eq!(next_capacity(&current, "1").unwrap().value(), 100 * GI + 1);
    }

    #[test]
    fn test_next_capacity_rounds_half_up() {
        // 15 * 10% = 1.5 -> 2
        let current = Quantity::new(15, nodeheal_types::QuantityFormat::DecimalSI);
        assert_eq!(next_capacity(&current, "10%").unwrap().value(), 17);
        // 14 * 10% = 1.4 -> 1
        let current = Quantity::new(14, nodeheal_types::QuantityFormat::DecimalSI);
        assert_eq!(next_capacity(&current, "10%").unwrap().value(), 15);
    }

    #[test]
    fn test_next_capacity_joins_both_errors() {
        let current = Quantity::parse("100Gi").unwrap();
        let err = next_capacity(&current, "lots").unwrap_err();
        match err {
            HealthError::InvalidIncrease { increase, source } => {
                assert_eq!(increase, "lots");
                assert_eq!(source.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // A fractional percentage is neither form.
        assert!(next_capacity(&current, "0.5%").is_err());
    }

    #[test]
    fn test_evaluate_below_trigger_is_noop() {
        let plan = CapacityPlanner::new().evaluate(
            &[usage("pvc-0", 79, "100Gi")],
            &spec("20%"),
            &BTreeMap::new(),
            Utc::now(),
        );
        assert!(!plan.has_patches());
        assert!(plan.error().is_none());
    }

    #[test]
    fn test_evaluate_requests_resize() {
        let now = Utc::now();
        let plan = CapacityPlanner::new().evaluate(
            &[usage("pvc-0", 80, "100Gi"), usage("pvc-1", 10, "100Gi")],
            &spec("20%"),
            &BTreeMap::new(),
            now,
        );
        assert_eq!(plan.patches.len(), 1);
        let patch = &plan.patches["pvc-0"];
        assert_eq!(patch.requested_size.value(), 120 * GI);
        assert_eq!(patch.requested_at, now);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let planner = CapacityPlanner::new();
        let samples = [usage("pvc-0", 90, "100Gi")];
        let first = planner.evaluate(&samples, &spec("20%"), &BTreeMap::new(), Utc::now());
        let second = planner.evaluate(&samples, &spec("20%"), &first.patches, Utc::now());
        assert!(!second.has_patches());
    }

    #[test]
    fn test_evaluate_clamped_request_is_idempotent() {
        let mut spec = spec("50%");
        spec.max_size = Some(Quantity::parse("120Gi").unwrap());
        let planner = CapacityPlanner::new();
        let samples = [usage("pvc-0", 90, "100Gi")];

        let first = planner.evaluate(&samples, &spec, &BTreeMap::new(), Utc::now());
        assert_eq!(first.patches["pvc-0"].requested_size.value(), 120 * GI);

        let second = planner.evaluate(&samples, &spec, &first.patches, Utc::now());
        assert!(!second.has_patches());
        assert!(second.error().is_none());
    }

    #[test]
    fn test_evaluate_clamps_to_max() {
        let mut spec = spec("50%");
        spec.max_size = Some(Quantity::parse("120Gi").unwrap());

        let plan = CapacityPlanner::new().evaluate(
            &[usage("pvc-0", 90, "100Gi"), usage("pvc-1", 95, "120Gi")],
            &spec,
            &BTreeMap::new(),
            Utc::now(),
        );
        assert_eq!(plan.patches.len(), 1);
        assert_eq!(plan.patches["pvc-0"].requested_size.value(), 120 * GI);
    }

    #[test]
    fn test_evaluate_zero_max_means_unbounded() {
        let mut spec = spec("50%");
        spec.max_size = Some(Quantity::ZERO);

        let plan = CapacityPlanner::new().evaluate(
            &[usage("pvc-0", 90, "100Gi")],
            &spec,
            &BTreeMap::new(),
            Utc::now(),
        );
        assert_eq!(plan.patches["pvc-0"].requested_size.value(), 150 * GI);
    }

    #[test]
    fn test_evaluate_invalid_increase_reports_error() {
        let plan = CapacityPlanner::new().evaluate(
            &[usage("pvc-0", 90, "100Gi"), usage("pvc-1", 90, "10Gi")],
            &spec("twenty"),
            &BTreeMap::new(),
            Utc::now(),
        );
        assert!(!plan.has_patches());
        let errors = plan.error().unwrap();
        assert_eq!(errors.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_below_trigger_never_patched(
            used in 0u32..80,
            capacity in 1i64..(1i64 << 50),
            percent in 1i64..200,
        ) {
            let sample = PvcDiskUsage {
                name: "pvc".into(),
                percent_used: used,
                capacity: Quantity::new(capacity, nodeheal_types::QuantityFormat::BinarySI),
            };
            let plan = CapacityPlanner::new().evaluate(
                &[sample],
                &spec(&format!("{}%", percent)),
                &BTreeMap::new(),
                Utc::now(),
            );
            prop_assert!(!plan.has_patches());
        }

        #[test]
        fn prop_percentage_growth_matches_rounding(
            capacity in 1i64..(1i64 << 50),
            percent in 0i64..500,
        ) {
            let current = Quantity::new(capacity, nodeheal_types::QuantityFormat::BinarySI);
            let next = next_capacity(&current, &format!("{}%", percent)).unwrap();
            let expected = (capacity as f64 * (1.0 + percent as f64 / 100.0)).round() as i64;
            // Exact arithmetic may differ from f64 by at most one unit.
            prop_assert!((next.value() - expected).abs() <= 1);
            prop_assert!(next.value() >= capacity);
        }

        #[test]
        fn prop_never_exceeds_ceiling(
            capacity in 1i64..(1i64 << 40),
            max in 1i64..(1i64 << 41),
            percent in 1i64..300,
        ) {
            let mut spec = spec(&format!("{}%", percent));
            spec.max_size = Some(Quantity::new(max, nodeheal_types::QuantityFormat::BinarySI));
            let sample = PvcDiskUsage {
                name: "pvc".into(),
                percent_used: 100,
                capacity: Quantity::new(capacity, nodeheal_types::QuantityFormat::BinarySI),
            };
            let plan = CapacityPlanner::new().evaluate(&[sample], &spec, &BTreeMap::new(), Utc::now());
            if capacity >= max {
                prop_assert!(!plan.has_patches());
            } else if let Some(patch) = plan.patches.get("pvc") {
                prop_assert!(patch.requested_size.value() <= max);
            }
        }
    }
}
