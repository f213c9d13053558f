//! Runtime handles returned by providers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A handle to artifact data produced at run time.
///
/// The engine never looks inside the blob; it only passes the handle from the
/// producing action to its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Location of the blob (e.g. `s3://bucket/key`).
    pub uri: String,
    /// Optional content digest reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Additional provider metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ArtifactHandle {
    /// Creates a new handle.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            digest: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the digest.
    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Reference to an object written by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Location of the stored object.
    pub uri: String,
    /// Object version, for versioned buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl StoredObject {
    /// Creates a new stored object reference.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version: None,
        }
    }

    /// Sets the object version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl From<StoredObject> for ArtifactHandle {
    fn from(object: StoredObject) -> Self {
        let handle = Self::new(object.uri);
        match object.version {
            Some(version) => handle.with_metadata("version", version),
            None => handle,
        }
    }
}

/// Result of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    /// Provider-side id of the deployment.
    pub deployment_id: String,
    /// The version label that was deployed.
    pub version_label: String,
}

impl DeployReceipt {
    /// Creates a new receipt.
    #[must_use]
    pub fn new(deployment_id: impl Into<String>, version_label: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            version_label: version_label.into(),
        }
    }
}

/// Result of provisioning a resource node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Provider-side physical id (ARN, URL, ...).
    pub physical_id: String,
}

impl ProvisionedResource {
    /// Creates a new provisioned resource reference.
    #[must_use]
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
        }
    }
}
