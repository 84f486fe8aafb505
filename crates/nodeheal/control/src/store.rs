//! Versioned resource storage.

use async_trait::async_trait;
use dashmap::DashMap;
use nodeheal_types::{FullNode, FullNodeSpec, FullNodeStatus, ResourceKey};

use crate::error::{ControlError, ControlResult};

/// Access to managed resources with compare-and-swap status writes.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a resource by key
    async fn get(&self, key: &ResourceKey) -> ControlResult<Option<FullNode>>;

    /// List the keys of all resources
    async fn list_keys(&self) -> ControlResult<Vec<ResourceKey>>;

    /// Replace the status if the stored version is still `resource_version`.
    ///
    /// Returns the updated resource, or [`ControlError::Conflict`] when the
    /// resource changed in the meantime.
    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: u64,
        status: FullNodeStatus,
    ) -> ControlResult<FullNode>;
}

/// In-memory store for development and testing
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: DashMap<ResourceKey, FullNode>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a resource, bumping its version.
    pub fn upsert(&self, mut resource: FullNode) -> FullNode {
        let version = self
            .resources
            .get(&resource.key)
            .map(|existing| existing.resource_version)
            .unwrap_or(0);
        resource.resource_version = version + 1;
        self.resources.insert(resource.key.clone(), resource.clone());
        resource
    }

    /// Replace the spec, keeping the status, as an operator edit would.
    pub fn update_spec(&self, key: &ResourceKey, spec: FullNodeSpec) -> ControlResult<FullNode> {
        let mut entry = self.resources.get_mut(key).ok_or_else(|| ControlError::NotFound {
            kind: "resource",
            name: key.to_string(),
        })?;
        entry.spec = spec;
        entry.resource_version += 1;
        Ok(entry.clone())
    }

    pub fn remove(&self, key: &ResourceKey) -> Option<FullNode> {
        self.resources.remove(key).map(|(_, resource)| resource)
    }

    pub fn snapshot(&self, key: &ResourceKey) -> Option<FullNode> {
        self.resources.get(key).map(|r| r.clone())
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get(&self, key: &ResourceKey) -> ControlResult<Option<FullNode>> {
        Ok(self.snapshot(key))
    }

    async fn list_keys(&self) -> ControlResult<Vec<ResourceKey>> {
        let mut keys: Vec<ResourceKey> = self.resources.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: u64,
        status: FullNodeStatus,
    ) -> ControlResult<FullNode> {
        let mut entry = self.resources.get_mut(key).ok_or_else(|| ControlError::NotFound {
            kind: "resource",
            name: key.to_string(),
        })?;

        if entry.resource_version != resource_version {
            return Err(ControlError::Conflict {
                key: key.clone(),
                expected: resource_version,
                actual: entry.resource_version,
            });
        }

        entry.status = status;
        entry.resource_version += 1;
        Ok(entry.clone())
    }
}
