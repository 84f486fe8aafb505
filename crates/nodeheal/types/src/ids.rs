//! Keys identifying resources and pruning candidates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespaced name of a managed [`FullNode`](crate::FullNode) resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Key of a pruning candidate in `status.selfHealing.pruning`.
///
/// Slashes are stripped because the key is used as a patch path segment.
pub fn candidate_key(pod_name: &str, namespace: &str) -> String {
    format!("{}.{}", namespace, pod_name).replace('/', "")
}
