//! The managed full-node resource and its self-heal specs.
//!
//! A [`FullNode`] describes a fleet of replicas. Its spec is written by the
//! operator; [`FullNodeStatus`] is written only through the controller's
//! persist step.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FullNodeStatus, IntOrPercent, Quantity, ResourceKey};

/// Default number of synced pods that must remain while one is pruned.
pub const DEFAULT_PRUNING_MIN_AVAILABLE: u32 = 2;

/// A fleet of blockchain full nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullNode {
    pub key: ResourceKey,

    /// Optimistic-concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub resource_version: u64,

    pub spec: FullNodeSpec,

    #[serde(default)]
    pub status: FullNodeStatus,
}

impl FullNode {
    pub fn new(key: ResourceKey, spec: FullNodeSpec) -> Self {
        Self {
            key,
            resource_version: 0,
            spec,
            status: FullNodeStatus::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullNodeSpec {
    /// Desired replica count.
    pub replicas: u32,

    #[serde(default)]
    pub rollout_strategy: RolloutStrategy,

    /// Self-healing behaviors. `None` disables the controller for this resource.
    #[serde(default)]
    pub self_heal: Option<SelfHealSpec>,
}

/// Disruption policy shared with the fleet's restart controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    /// Pods allowed to be unavailable at once; defaults to 1 when unset.
    #[serde(default)]
    pub max_unavailable: Option<IntOrPercent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfHealSpec {
    /// Grow PVCs as they approach capacity.
    #[serde(default)]
    pub pvc_auto_scale: Option<PvcAutoScaleSpec>,

    /// Delete pods whose height stalls or falls behind the fleet.
    #[serde(default)]
    pub height_drift_mitigation: Option<HeightDriftMitigationSpec>,

    /// Reclaim disk by temporarily substituting a pod with a pruning job.
    /// Evaluated before PVC autoscaling.
    #[serde(default)]
    pub pruning: Option<PruningSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcAutoScaleSpec {
    /// Used-space percentage (1-100) at which a resize is requested.
    pub used_space_percentage: u32,

    /// Either a percentage of current capacity (`"20%"`) or a quantity to add (`"100Gi"`).
    pub increase_quantity: String,

    /// Ceiling; once capacity reaches it autoscaling stops.
    #[serde(default)]
    pub max_size: Option<Quantity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightDriftMitigationSpec {
    /// A synced pod this many blocks behind the tallest synced pod is lagging.
    pub threshold_height: u64,

    /// A synced pod whose height has been flat this long is lagging. Zero or unset disables.
    #[serde(default, with = "duration_serde::option")]
    pub max_height_retention_time: Option<Duration>,

    /// Regenerate a pod's PVC after repeated drift deletions.
    #[serde(default)]
    pub regenerate_pvc: Option<RegeneratePvcSpec>,
}

impl HeightDriftMitigationSpec {
    /// Retention threshold, only when configured and non-zero.
    pub fn retention_threshold(&self) -> Option<Duration> {
        self.max_height_retention_time.filter(|d| !d.is_zero())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegeneratePvcSpec {
    /// Sliding window over which failures are counted.
    #[serde(with = "duration_serde")]
    pub failed_count_collection_duration: Duration,

    /// Failure count within the window that triggers regeneration.
    pub threshold_count: u32,
}

/// Pruning policy.
///
/// The job parameters are consumed by the external job builder; the
/// controller itself only reads the trigger and availability fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruningSpec {
    /// Used-space percentage (1-100) at which a pod becomes a pruning candidate.
    pub used_space_percentage: u32,

    /// Synced pods that must remain while one is pruned.
    #[serde(default)]
    pub min_available: Option<u32>,

    /// Data directory; the builder falls back to the node home when empty.
    #[serde(default)]
    pub data_dir: String,

    #[serde(default = "default_keep")]
    pub blocks: u64,

    #[serde(default = "default_keep")]
    pub versions: u64,

    #[serde(default = "default_true")]
    pub cosmos_sdk: bool,

    #[serde(default = "default_true")]
    pub tendermint: bool,

    #[serde(default = "default_true")]
    pub tx_index: bool,

    #[serde(default = "default_true")]
    pub compact: bool,

    #[serde(default)]
    pub backend: DbBackend,
}

impl PruningSpec {
    pub fn new(used_space_percentage: u32) -> Self {
        Self {
            used_space_percentage,
            min_available: None,
            data_dir: String::new(),
            blocks: default_keep(),
            versions: default_keep(),
            cosmos_sdk: true,
            tendermint: true,
            tx_index: true,
            compact: true,
            backend: DbBackend::default(),
        }
    }

    pub fn min_available(&self) -> u32 {
        self.min_available.unwrap_or(DEFAULT_PRUNING_MIN_AVAILABLE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    #[default]
    Goleveldb,
    Pebbledb,
}

fn default_keep() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Serde helper for Duration, as milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| d.as_millis() as u64)
                .serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = Option::<u64>::deserialize(deserializer)?;
            Ok(millis.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pruning_defaults() {
        let spec: PruningSpec =
            serde_json::from_str(r#"{"usedSpacePercentage": 80}"#).unwrap();
        assert_eq!(spec.min_available(), DEFAULT_PRUNING_MIN_AVAILABLE);
        assert_eq!(spec.blocks, 10);
        assert_eq!(spec.versions, 10);
        assert!(spec.compact);
        assert_eq!(spec.backend, DbBackend::Goleveldb);
        assert_eq!(spec, PruningSpec::new(80));
    }

    #[test]
    fn test_retention_threshold_ignores_zero() {
        let mut spec = HeightDriftMitigationSpec {
            threshold_height: 50,
            max_height_retention_time: Some(Duration::ZERO),
            regenerate_pvc: None,
        };
        assert_eq!(spec.retention_threshold(), None);

        spec.max_height_retention_time = Some(Duration::from_secs(300));
        assert_eq!(spec.retention_threshold(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_spec_deserializes_from_json() {
        let raw = r#"{
            "replicas": 3,
            "rolloutStrategy": {"maxUnavailable": "50%"},
            "selfHeal": {
                "pvcAutoScale": {"usedSpacePercentage": 80, "increaseQuantity": "20%", "maxSize": "2Ti"},
                "heightDriftMitigation": {
                    "thresholdHeight": 50,
                    "maxHeightRetentionTime": 60000,
                    "regeneratePvc": {"failedCountCollectionDuration": 300000, "thresholdCount": 3}
                }
            }
        }"#;
        let spec: FullNodeSpec = serde_json::from_str(raw).unwrap();
        let heal = spec.self_heal.unwrap();
        assert_eq!(spec.rollout_strategy.max_unavailable, Some(IntOrPercent::percent(50)));
        assert_eq!(
            heal.pvc_auto_scale.unwrap().max_size,
            Some(Quantity::parse("2Ti").unwrap())
        );
        let drift = heal.height_drift_mitigation.unwrap();
        assert_eq!(drift.retention_threshold(), Some(Duration::from_secs(60)));
        assert_eq!(
            drift.regenerate_pvc.unwrap().failed_count_collection_duration,
            Duration::from_secs(300)
        );
        assert!(heal.pruning.is_none());
    }
}
