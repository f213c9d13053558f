//! Artifact registry: named artifacts and their producer/consumer edges.

use crate::errors::SpecificationError;
use std::collections::HashMap;

/// A named, pipeline-scoped handle to data flowing between actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Unique name within the pipeline.
    pub name: String,
    /// The producing action, once one has declared it as output.
    pub producer: Option<String>,
    /// Resource node owning the artifact's storage, if bound.
    pub storage: Option<String>,
    /// Additional actions that also claimed to produce it.
    conflicting_producers: Vec<String>,
}

impl Artifact {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            producer: None,
            storage: None,
            conflicting_producers: Vec::new(),
        }
    }

    /// Actions whose output declaration clashed with the producer.
    #[must_use]
    pub fn conflicting_producers(&self) -> &[String] {
        &self.conflicting_producers
    }
}

/// An input reference from an action to an artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    /// The referenced artifact name.
    pub artifact: String,
    /// The consuming action.
    pub consumer: String,
}

/// Tracks artifacts and the edges between their producers and consumers.
///
/// References may be declared before their producer; resolution is enforced
/// by validation, not at registration time.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    artifacts: Vec<Artifact>,
    index: HashMap<String, usize>,
    references: Vec<ArtifactReference>,
}

impl ArtifactRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, name: &str) -> &mut Artifact {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.artifacts.push(Artifact::new(name));
                let idx = self.artifacts.len() - 1;
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.artifacts[idx]
    }

    /// Declares an artifact without a producer, optionally binding its storage.
    ///
    /// Declaring the same name again merges the storage binding.
    pub fn declare_artifact(&mut self, name: &str, storage: Option<&str>) -> &Artifact {
        let artifact = self.entry(name);
        if let Some(storage) = storage {
            artifact.storage = Some(storage.to_string());
        }
        artifact
    }

    /// Declares `name` as an output of `action`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateArtifact` if another action already produces `name`.
    /// The conflicting claim is kept so validation reports it as well.
    pub fn declare_output(
        &mut self,
        action: &str,
        name: &str,
        storage: Option<&str>,
    ) -> Result<&Artifact, SpecificationError> {
        let artifact = self.entry(name);

        if let Some(first) = artifact.producer.clone() {
            artifact.conflicting_producers.push(action.to_string());
            return Err(SpecificationError::DuplicateArtifact {
                artifact: name.to_string(),
                first,
                second: action.to_string(),
            });
        }

        artifact.producer = Some(action.to_string());
        if let Some(storage) = storage {
            artifact.storage = Some(storage.to_string());
        }
        Ok(artifact)
    }

    /// Records that `action` consumes `name`.
    pub fn declare_input(&mut self, action: &str, name: &str) -> ArtifactReference {
        let reference = ArtifactReference {
            artifact: name.to_string(),
            consumer: action.to_string(),
        };
        self.references.push(reference.clone());
        reference
    }

    /// Looks up an artifact by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.index.get(name).map(|&idx| &self.artifacts[idx])
    }

    /// Resolves a name to a produced artifact.
    ///
    /// # Errors
    ///
    /// Returns `UnknownArtifact` if no action produces `name`.
    pub fn resolve(&self, consumer: &str, name: &str) -> Result<&Artifact, SpecificationError> {
        self.get(name)
            .filter(|artifact| artifact.producer.is_some())
            .ok_or_else(|| SpecificationError::UnknownArtifact {
                artifact: name.to_string(),
                consumer: consumer.to_string(),
            })
    }

    /// Returns the producing action of `name`.
    #[must_use]
    pub fn producer_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|artifact| artifact.producer.as_deref())
    }

    /// Returns the consumers of `name` in declaration order.
    #[must_use]
    pub fn consumers_of(&self, name: &str) -> Vec<&str> {
        self.references
            .iter()
            .filter(|reference| reference.artifact == name)
            .map(|reference| reference.consumer.as_str())
            .collect()
    }

    /// Iterates artifacts in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    /// All input references in declaration order.
    #[must_use]
    pub fn references(&self) -> &[ArtifactReference] {
        &self.references
    }

    /// Number of declared artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if no artifacts are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
