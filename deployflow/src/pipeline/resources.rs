//! Resource dependency graph: "must exist before" edges between resource nodes.

use super::artifacts::ArtifactRegistry;
use super::model::Action;
use super::retry::RetryConfig;
use crate::core::ResourceKind;
use crate::errors::SpecificationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A provisioned side effect (repository, bucket, application version, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Unique id.
    pub id: String,
    /// What kind of resource this is.
    #[serde(default)]
    pub kind: ResourceKind,
    /// Provider-specific properties passed through to the provisioner.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Retry policy for provisioning; falls back to the executor default.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(skip)]
    depends_on: Vec<String>,
    #[serde(skip)]
    pub(crate) declared_at: usize,
}

impl ResourceNode {
    /// Creates a new resource node.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: BTreeMap::new(),
            retry: None,
            depends_on: Vec::new(),
            declared_at: 0,
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Explicit dependencies in declaration order.
    #[must_use]
    pub fn explicit_dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub(crate) fn without_dependencies(&self) -> Self {
        Self {
            depends_on: Vec::new(),
            ..self.clone()
        }
    }
}

/// An edge derived from artifact flow rather than declared explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitEdge {
    /// Resource owning the artifact's storage.
    pub from: String,
    /// Resource owned by the consuming action.
    pub to: String,
    /// The artifact that induced the edge.
    pub artifact: String,
}

/// Explicit and implicit dependency edges between resource nodes.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    implicit: Vec<ImplicitEdge>,
}

impl ResourceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResource` if the id is taken.
    pub fn add_node(&mut self, node: ResourceNode) -> Result<(), SpecificationError> {
        if self.index.contains_key(&node.id) {
            return Err(SpecificationError::DuplicateResource { resource: node.id });
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Records that `id` must be created after `depends_on`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` if either id is unregistered and
    /// `SelfDependency` if both are the same.
    pub fn add_dependency(&mut self, id: &str, depends_on: &str) -> Result<(), SpecificationError> {
        for (missing, referenced_by) in [(id, depends_on), (depends_on, id)] {
            if !self.index.contains_key(missing) {
                return Err(SpecificationError::UnknownNode {
                    node: missing.to_string(),
                    referenced_by: referenced_by.to_string(),
                });
            }
        }
        if id == depends_on {
            return Err(SpecificationError::SelfDependency { node: id.to_string() });
        }

        let idx = self.index[id];
        let deps = &mut self.nodes[idx].depends_on;
        if !deps.iter().any(|d| d == depends_on) {
            deps.push(depends_on.to_string());
        }
        Ok(())
    }

    /// Recomputes the implicit edges from artifact flow.
    ///
    /// For every input X of action B, adds `owner(X) -> owner(B)`, where the
    /// owner of X is its storage binding or else its producer's resource.
    /// Edges to unknown nodes, self edges and edges already declared
    /// explicitly are not added.
    pub fn derive_implicit_edges(&mut self, actions: &[Action], artifacts: &ArtifactRegistry) {
        let action_resources: HashMap<&str, &str> = actions
            .iter()
            .filter_map(|action| action.resource.as_deref().map(|r| (action.name.as_str(), r)))
            .collect();

        let mut derived: Vec<ImplicitEdge> = Vec::new();
        for action in actions {
            let Some(to) = action.resource.as_deref() else {
                continue;
            };
            for input in &action.inputs {
                let Some(artifact) = artifacts.get(input) else {
                    continue;
                };
                let owner = artifact.storage.as_deref().or_else(|| {
                    artifact
                        .producer
                        .as_deref()
                        .and_then(|producer| action_resources.get(producer).copied())
                });
                let Some(from) = owner else {
                    continue;
                };
                if from == to || !self.contains(from) || !self.contains(to) {
                    continue;
                }
                let explicit = self
                    .get(to)
                    .is_some_and(|node| node.depends_on.iter().any(|d| d == from));
                let seen = derived.iter().any(|e| e.from == from && e.to == to);
                if !explicit && !seen {
                    derived.push(ImplicitEdge {
                        from: from.to_string(),
                        to: to.to_string(),
                        artifact: input.clone(),
                    });
                }
            }
        }

        if !derived.is_empty() {
            tracing::debug!(edges = derived.len(), "Derived implicit resource edges");
        }
        self.implicit = derived;
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// Iterates nodes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    /// The implicit edges from the last derivation.
    #[must_use]
    pub fn implicit_edges(&self) -> &[ImplicitEdge] {
        &self.implicit
    }

    /// Explicit followed by implicit dependencies of `id`, without duplicates.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .get(id)
            .map(|node| node.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default();
        for edge in self.implicit.iter().filter(|e| e.to == id) {
            if !deps.contains(&edge.from.as_str()) {
                deps.push(edge.from.as_str());
            }
        }
        deps
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
