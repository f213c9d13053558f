//! Runtime artifact and resource handles of a run.

use crate::core::{ArtifactHandle, ProvisionedResource};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Concurrent map from artifact name to the handle its producer returned,
/// and from resource id to its provisioned reference.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: DashMap<String, ArtifactHandle>,
    resources: DashMap<String, ProvisionedResource>,
}

impl ArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handle of an artifact.
    pub fn put(&self, artifact: impl Into<String>, handle: ArtifactHandle) {
        self.artifacts.insert(artifact.into(), handle);
    }

    /// Handle of an artifact.
    #[must_use]
    pub fn get(&self, artifact: &str) -> Option<ArtifactHandle> {
        self.artifacts.get(artifact).map(|h| h.value().clone())
    }

    /// Handles of the given artifacts that are available, in the given order.
    #[must_use]
    pub fn gather<S: AsRef<str>>(&self, artifacts: &[S]) -> Vec<ArtifactHandle> {
        artifacts.iter().filter_map(|name| self.get(name.as_ref())).collect()
    }

    /// Registers a provisioned resource.
    pub fn put_resource(&self, id: impl Into<String>, resource: ProvisionedResource) {
        self.resources.insert(id.into(), resource);
    }

    /// Provisioned reference of a resource.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<ProvisionedResource> {
        self.resources.get(id).map(|r| r.value().clone())
    }

    /// Number of artifact handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if no artifact handle is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Sorted copy of every provisioned resource.
    #[must_use]
    pub fn resource_snapshot(&self) -> BTreeMap<String, ProvisionedResource> {
        self.resources
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Sorted copy of every artifact handle.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ArtifactHandle> {
        self.artifacts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
