//! Provider capability interfaces consumed by the executor.
//!
//! Each capability is a single async operation. Concrete source control,
//! build runners, object storage and deployment targets live behind these
//! traits.

use crate::core::{ArtifactHandle, Capability, DeployReceipt, ProvisionedResource, StoredObject};
use crate::errors::ProviderError;
use crate::pipeline::ResourceNode;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Fetches a source snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetches `repository` and returns a handle to the snapshot.
    async fn fetch_source(&self, repository: &str) -> Result<ArtifactHandle, ProviderError>;
}

/// Runs builds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildProvider: Send + Sync {
    /// Runs `project` over the input artifacts and returns the build output.
    async fn run_build(
        &self,
        project: &str,
        inputs: &[ArtifactHandle],
    ) -> Result<ArtifactHandle, ProviderError>;
}

/// Writes artifacts to object storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Writes `artifact` under `destination_key`.
    async fn write_storage(
        &self,
        artifact: &ArtifactHandle,
        destination_key: &str,
    ) -> Result<StoredObject, ProviderError>;
}

/// Deploys artifacts to a target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeployProvider: Send + Sync {
    /// Deploys `artifact` to `target` under `version_label`.
    async fn deploy(
        &self,
        target: &str,
        artifact: &ArtifactHandle,
        version_label: &str,
    ) -> Result<DeployReceipt, ProviderError>;
}

/// Creates resource nodes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Ensures `resource` exists.
    async fn provision(&self, resource: &ResourceNode) -> Result<ProvisionedResource, ProviderError>;
}

/// One provider per capability.
#[derive(Clone, Default)]
pub struct ProviderSet {
    source: Option<Arc<dyn SourceProvider>>,
    build: Option<Arc<dyn BuildProvider>>,
    storage: Option<Arc<dyn StorageProvider>>,
    deploy: Option<Arc<dyn DeployProvider>>,
    provisioner: Option<Arc<dyn ResourceProvisioner>>,
}

impl ProviderSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses one value for every capability.
    #[must_use]
    pub fn uniform<P>(provider: Arc<P>) -> Self
    where
        P: SourceProvider
            + BuildProvider
            + StorageProvider
            + DeployProvider
            + ResourceProvisioner
            + 'static,
    {
        Self {
            source: Some(provider.clone()),
            build: Some(provider.clone()),
            storage: Some(provider.clone()),
            deploy: Some(provider.clone()),
            provisioner: Some(provider),
        }
    }

    /// Sets the source provider.
    #[must_use]
    pub fn with_source(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.source = Some(provider);
        self
    }

    /// Sets the build provider.
    #[must_use]
    pub fn with_build(mut self, provider: Arc<dyn BuildProvider>) -> Self {
        self.build = Some(provider);
        self
    }

    /// Sets the storage provider.
    #[must_use]
    pub fn with_storage(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(provider);
        self
    }

    /// Sets the deploy provider.
    #[must_use]
    pub fn with_deploy(mut self, provider: Arc<dyn DeployProvider>) -> Self {
        self.deploy = Some(provider);
        self
    }

    /// Sets the resource provisioner.
    #[must_use]
    pub fn with_provisioner(mut self, provider: Arc<dyn ResourceProvisioner>) -> Self {
        self.provisioner = Some(provider);
        self
    }

    /// Returns true if a provider is registered for `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::SourceFetch => self.source.is_some(),
            Capability::Build => self.build.is_some(),
            Capability::StoreWrite => self.storage.is_some(),
            Capability::Deploy => self.deploy.is_some(),
            Capability::Provision => self.provisioner.is_some(),
        }
    }

    /// The source provider.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<dyn SourceProvider>> {
        self.source.as_ref()
    }

    /// The build provider.
    #[must_use]
    pub fn build(&self) -> Option<&Arc<dyn BuildProvider>> {
        self.build.as_ref()
    }

    /// The storage provider.
    #[must_use]
    pub fn storage(&self) -> Option<&Arc<dyn StorageProvider>> {
        self.storage.as_ref()
    }

    /// The deploy provider.
    #[must_use]
    pub fn deploy(&self) -> Option<&Arc<dyn DeployProvider>> {
        self.deploy.as_ref()
    }

    /// The resource provisioner.
    #[must_use]
    pub fn provisioner(&self) -> Option<&Arc<dyn ResourceProvisioner>> {
        self.provisioner.as_ref()
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("source", &self.source.is_some())
            .field("build", &self.build.is_some())
            .field("storage", &self.storage.is_some())
            .field("deploy", &self.deploy.is_some())
            .field("provisioner", &self.provisioner.is_some())
            .finish()
    }
}
