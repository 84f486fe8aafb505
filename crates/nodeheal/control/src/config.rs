//! Configuration for the self-healing controller

use std::time::Duration;

use nodeheal_prune::PruningConfig;
use serde::{Deserialize, Serialize};

/// Main controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Delay before a resource is reconciled again, in seconds
    #[serde(default = "default_requeue_after")]
    pub requeue_after_secs: u64,

    /// Ceiling on a single collaborator call, in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Deadline for a whole cycle, in seconds
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Resources reconciled in parallel
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_resources: usize,

    /// Pruning cycle timing
    #[serde(default)]
    pub pruning: PruningSettings,

    /// Height drift mitigation
    #[serde(default)]
    pub drift: DriftSettings,

    /// Status persistence
    #[serde(default)]
    pub persist: PersistSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_after_secs: default_requeue_after(),
            io_timeout_secs: default_io_timeout(),
            cycle_timeout_secs: default_cycle_timeout(),
            max_concurrent_resources: default_max_concurrent(),
            pruning: PruningSettings::default(),
            drift: DriftSettings::default(),
            persist: PersistSettings::default(),
        }
    }
}

/// Pruning cycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningSettings {
    /// Re-poll delay after a transition or transient failure, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Re-poll delay while a pruning job runs, in seconds
    #[serde(default = "default_complete_poll_delay")]
    pub complete_poll_delay_secs: u64,

    /// Candidate discovery ceiling, in seconds
    #[serde(default = "default_candidate_timeout")]
    pub candidate_timeout_secs: u64,
}

impl Default for PruningSettings {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay(),
            complete_poll_delay_secs: default_complete_poll_delay(),
            candidate_timeout_secs: default_candidate_timeout(),
        }
    }
}

/// Height drift mitigation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSettings {
    /// Time a pod must have been ready to count toward the rollout budget, in seconds
    #[serde(default = "default_min_ready")]
    pub min_ready_secs: u64,
}

impl Default for DriftSettings {
    fn default() -> Self {
        Self {
            min_ready_secs: default_min_ready(),
        }
    }
}

/// Optimistic status persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistSettings {
    /// Fetch-mutate-write attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Extra random delay as a fraction of the backoff
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

// Default value helpers
fn default_requeue_after() -> u64 {
    60
}

fn default_io_timeout() -> u64 {
    10
}

fn default_cycle_timeout() -> u64 {
    50
}

fn default_max_concurrent() -> usize {
    10
}

fn default_retry_delay() -> u64 {
    10
}

fn default_complete_poll_delay() -> u64 {
    30
}

fn default_candidate_timeout() -> u64 {
    10
}

fn default_min_ready() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    10
}

fn default_jitter() -> f64 {
    0.1
}

impl ControllerConfig {
    /// Load configuration from defaults, an optional file and `NODEHEAL_` environment variables.
    ///
    /// Nested keys use a double underscore: `NODEHEAL_PERSIST__MAX_ATTEMPTS=3`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ControllerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NODEHEAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn min_ready(&self) -> Duration {
        Duration::from_secs(self.drift.min_ready_secs)
    }

    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.persist.backoff_ms)
    }

    /// Timing for the pruning state machine.
    pub fn pruning_config(&self) -> PruningConfig {
        PruningConfig {
            retry_delay: Duration::from_secs(self.pruning.retry_delay_secs),
            complete_poll_delay: Duration::from_secs(self.pruning.complete_poll_delay_secs),
            candidate_timeout: Duration::from_secs(self.pruning.candidate_timeout_secs),
            io_timeout: self.io_timeout(),
        }
    }
}
