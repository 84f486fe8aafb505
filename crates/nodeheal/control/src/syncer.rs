//! Status persistence with bounded optimistic retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodeheal_health::StatusPatch;
use nodeheal_types::ResourceKey;
use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::config::ControllerConfig;
use crate::error::{ControlError, ControlResult};
use crate::store::ResourceStore;

/// Applies a status patch to the latest version of a resource.
#[async_trait]
pub trait StatusSyncer: Send + Sync {
    async fn sync_update(&self, key: &ResourceKey, patch: &StatusPatch) -> ControlResult<()>;
}

/// Fetch-mutate-write loop over a [`ResourceStore`].
///
/// On a version conflict the patch is re-applied to the freshly fetched
/// resource, never written blindly over it.
pub struct RetryingStatusSyncer {
    store: Arc<dyn ResourceStore>,
    max_attempts: u32,
    backoff: Duration,
    jitter: f64,
}

impl RetryingStatusSyncer {
    pub fn new(store: Arc<dyn ResourceStore>, max_attempts: u32, backoff: Duration, jitter: f64) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            backoff,
            jitter: jitter.max(0.0),
        }
    }

    pub fn from_config(store: Arc<dyn ResourceStore>, config: &ControllerConfig) -> Self {
        Self::new(
            store,
            config.persist.max_attempts,
            config.persist_backoff(),
            config.persist.jitter,
        )
    }

    fn next_delay(&self) -> Duration {
        if self.jitter == 0.0 {
            return self.backoff;
        }
        let factor = rand::thread_rng().gen::<f64>() * self.jitter;
        self.backoff + self.backoff.mul_f64(factor)
    }
}

#[async_trait]
impl StatusSyncer for RetryingStatusSyncer {
    #[instrument(skip(self, patch), fields(ops = patch.len()))]
    async fn sync_update(&self, key: &ResourceKey, patch: &StatusPatch) -> ControlResult<()> {
        for attempt in 1..=self.max_attempts {
            let resource = self
                .store
                .get(key)
                .await?
                .ok_or_else(|| ControlError::NotFound {
                    kind: "resource",
                    name: key.to_string(),
                })?;

            let mut status = resource.status.clone();
            patch.apply(&mut status);
            if status == resource.status {
                debug!("Status unchanged, skipping write");
                return Ok(());
            }

            match self
                .store
                .update_status(key, resource.resource_version, status)
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if err.is_conflict() => {
                    debug!(attempt = attempt, error = %err, "Status write conflicted, retrying");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.next_delay()).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        warn!(attempts = self.max_attempts, "Giving up on status write");
        Err(ControlError::RetriesExhausted {
            key: key.clone(),
            attempts: self.max_attempts,
        })
    }
}
