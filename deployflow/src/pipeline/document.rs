//! Declarative pipeline documents (YAML or JSON).

use super::builder::{ActionSpec, PipelineBuilder};
use super::model::Pipeline;
use super::resources::ResourceNode;
use super::retry::RetryConfig;
use super::validation::{ValidatedPipeline, ValidationReport};
use crate::core::{BarrierPolicy, ResourceKind};
use crate::errors::LoadError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A resource entry of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    /// Unique id.
    pub id: String,
    /// Resource kind.
    #[serde(default)]
    pub kind: ResourceKind,
    /// Ids this resource must be created after.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Provider-specific properties.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Retry policy for provisioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// An up-front artifact declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDocument {
    /// Artifact name.
    pub name: String,
    /// Resource node owning its storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

/// A stage entry of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDocument {
    /// Unique name.
    pub name: String,
    /// Barrier policy.
    #[serde(default)]
    pub barrier: BarrierPolicy,
    /// Actions in declaration order.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

/// A complete pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    /// Pipeline name.
    pub name: String,
    /// Resource nodes.
    #[serde(default)]
    pub resources: Vec<ResourceDocument>,
    /// Artifacts declared ahead of their producers.
    #[serde(default)]
    pub artifacts: Vec<ArtifactDocument>,
    /// Stages in order.
    #[serde(default)]
    pub stages: Vec<StageDocument>,
}

impl PipelineDocument {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Yaml`] on malformed input.
    pub fn from_yaml_str(content: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Json`] on malformed input.
    pub fn from_json_str(content: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads a document, choosing the format by file extension.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] if the file cannot be read or parsed, or has
    /// an unsupported extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let content = match extension.as_str() {
            "yaml" | "yml" | "json" => std::fs::read_to_string(path)?,
            _ => return Err(LoadError::UnsupportedFormat(path.display().to_string())),
        };
        tracing::debug!(path = %path.display(), "Loading pipeline document");

        if extension == "json" {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Serializes the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Yaml`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, LoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Feeds every declaration to a fresh builder.
    ///
    /// Resources come first so dependencies may name resources declared
    /// later in the list. Builder errors travel with the returned pipeline.
    #[must_use]
    pub fn build(&self) -> Pipeline {
        let mut builder = PipelineBuilder::new(&self.name);

        for resource in &self.resources {
            let mut node = ResourceNode::new(&resource.id, resource.kind);
            node.properties.clone_from(&resource.properties);
            node.retry.clone_from(&resource.retry);
            let _ = builder.add_resource(node);
        }
        for resource in &self.resources {
            for dep in &resource.depends_on {
                let _ = builder.add_dependency(&resource.id, dep);
            }
        }
        for artifact in &self.artifacts {
            let _ = builder.declare_artifact(&artifact.name, artifact.storage.as_deref());
        }
        for stage in &self.stages {
            if builder.add_stage_with_barrier(&stage.name, stage.barrier).is_err() {
                continue;
            }
            for action in &stage.actions {
                let _ = builder.add_action(&stage.name, action.clone());
            }
        }
        builder.build()
    }

    /// Builds and validates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a report with every builder and validation error.
    pub fn into_pipeline(self) -> Result<ValidatedPipeline, ValidationReport> {
        ValidatedPipeline::new(self.build())
    }
}
