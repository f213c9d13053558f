//! Pipeline model: ordered stages, their actions, and the node graph they form.

use super::artifacts::ArtifactRegistry;
use super::builder::{ActionSpec, PipelineBuilder};
use super::resources::ResourceGraph;
use super::retry::RetryConfig;
use crate::core::{ActionKind, BarrierPolicy, Capability, NodeRef};
use crate::errors::SpecificationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An output artifact declaration.
///
/// Deserializes from either a bare artifact name or `{ name, storage }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OutputEntry")]
pub struct OutputDecl {
    /// Artifact name.
    pub name: String,
    /// Resource node owning the artifact's storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl OutputDecl {
    /// Creates an output without a storage binding.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: None,
        }
    }

    /// Binds the output to a storage resource.
    #[must_use]
    pub fn stored_in(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutputEntry {
    Name(String),
    Decl {
        name: String,
        #[serde(default)]
        storage: Option<String>,
    },
}

impl From<OutputEntry> for OutputDecl {
    fn from(entry: OutputEntry) -> Self {
        match entry {
            OutputEntry::Name(name) => Self::new(name),
            OutputEntry::Decl { name, storage } => Self { name, storage },
        }
    }
}

/// Which provider executes an action, with the provider-specific reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum ProviderBinding {
    /// Fetch a source snapshot.
    SourceFetch {
        /// Repository or object reference.
        repository: String,
    },
    /// Run a build.
    Build {
        /// Build project reference.
        project: String,
    },
    /// Write an artifact to storage.
    StoreWrite {
        /// Destination key.
        destination_key: String,
    },
    /// Deploy an artifact to a target.
    Deploy {
        /// Target environment reference.
        target: String,
        /// Fixed version label; generated per run when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version_label: Option<String>,
    },
}

impl ProviderBinding {
    /// Creates a source-fetch binding.
    #[must_use]
    pub fn source_fetch(repository: impl Into<String>) -> Self {
        Self::SourceFetch {
            repository: repository.into(),
        }
    }

    /// Creates a build binding.
    #[must_use]
    pub fn build(project: impl Into<String>) -> Self {
        Self::Build {
            project: project.into(),
        }
    }

    /// Creates a store-write binding.
    #[must_use]
    pub fn store_write(destination_key: impl Into<String>) -> Self {
        Self::StoreWrite {
            destination_key: destination_key.into(),
        }
    }

    /// Creates a deploy binding with a generated version label.
    #[must_use]
    pub fn deploy(target: impl Into<String>) -> Self {
        Self::Deploy {
            target: target.into(),
            version_label: None,
        }
    }

    /// Creates a deploy binding with a fixed version label.
    #[must_use]
    pub fn deploy_version(target: impl Into<String>, version_label: impl Into<String>) -> Self {
        Self::Deploy {
            target: target.into(),
            version_label: Some(version_label.into()),
        }
    }

    /// The capability this binding requires.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::SourceFetch { .. } => Capability::SourceFetch,
            Self::Build { .. } => Capability::Build,
            Self::StoreWrite { .. } => Capability::StoreWrite,
            Self::Deploy { .. } => Capability::Deploy,
        }
    }

    /// The default binding for an action kind, referencing the action itself.
    #[must_use]
    pub fn default_for(kind: ActionKind, action: &str) -> Option<Self> {
        match kind.default_capability()? {
            Capability::SourceFetch => Some(Self::source_fetch(action)),
            Capability::Build => Some(Self::build(action)),
            Capability::Deploy => Some(Self::deploy(action)),
            Capability::StoreWrite | Capability::Provision => None,
        }
    }
}

/// A unit of work within a stage, bound to one provider capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Pipeline-unique name.
    pub name: String,
    /// Owning stage.
    pub stage: String,
    /// Index of the owning stage.
    pub stage_index: usize,
    /// Action kind.
    pub kind: ActionKind,
    /// Input artifact names in declaration order.
    pub inputs: Vec<String>,
    /// Output declarations in declaration order.
    pub outputs: Vec<OutputDecl>,
    /// The provider binding.
    pub binding: ProviderBinding,
    /// The resource node this action operates on.
    pub resource: Option<String>,
    /// Explicit resource dependencies.
    pub resource_dependencies: Vec<String>,
    /// Retry policy; falls back to the executor default.
    pub retry: Option<RetryConfig>,
    /// Per-attempt timeout; falls back to the executor default.
    pub timeout_ms: Option<u64>,
    pub(crate) declared_at: usize,
}

impl Action {
    /// The capability that executes this action.
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.binding.capability()
    }

    /// Reference to this action in the node graph.
    #[must_use]
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::action(&self.name)
    }

    /// Names of the output artifacts.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }
}

/// An ordered phase of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Unique name.
    pub name: String,
    /// Position in the pipeline.
    pub index: usize,
    /// When the stage counts as complete.
    pub barrier: BarrierPolicy,
    /// Action names in declaration order.
    pub actions: Vec<String>,
}

/// Stages, actions, artifacts and resource nodes of one deployment flow.
///
/// A pipeline is immutable once built. Use [`Pipeline::to_builder`] to derive
/// a modified copy.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) name: String,
    pub(crate) stages: Vec<Stage>,
    pub(crate) actions: Vec<Action>,
    pub(crate) action_index: HashMap<String, usize>,
    pub(crate) artifacts: ArtifactRegistry,
    pub(crate) resources: ResourceGraph,
    pub(crate) construction_errors: Vec<SpecificationError>,
}

impl Pipeline {
    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in pipeline order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Actions in declaration order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.action_index.get(name).map(|&idx| &self.actions[idx])
    }

    /// The artifact registry.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactRegistry {
        &self.artifacts
    }

    /// The resource dependency graph.
    #[must_use]
    pub fn resources(&self) -> &ResourceGraph {
        &self.resources
    }

    /// Errors the builder recorded while this pipeline was assembled.
    #[must_use]
    pub fn construction_errors(&self) -> &[SpecificationError] {
        &self.construction_errors
    }

    /// Returns true if `node` exists in this pipeline.
    #[must_use]
    pub fn contains(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Action(name) => self.action_index.contains_key(name),
            NodeRef::Resource(id) => self.resources.contains(id),
        }
    }

    /// The resource node owning an artifact: its storage binding, else the
    /// producing action's resource.
    #[must_use]
    pub fn artifact_owner(&self, artifact: &str) -> Option<&str> {
        let artifact = self.artifacts.get(artifact)?;
        artifact.storage.as_deref().or_else(|| {
            artifact
                .producer
                .as_deref()
                .and_then(|producer| self.action(producer))
                .and_then(|action| action.resource.as_deref())
        })
    }

    /// The stage that must complete before `action` may start: the nearest
    /// earlier stage that has at least one action.
    #[must_use]
    pub fn gating_stage(&self, action: &str) -> Option<&Stage> {
        let stage_index = self.action(action)?.stage_index;
        self.stages[..stage_index]
            .iter()
            .rev()
            .find(|stage| !stage.actions.is_empty())
    }

    /// Hard requirements of a node: nodes that must have succeeded before it
    /// may start. Stage ordering is not included.
    ///
    /// For an action: its resource, its resource dependencies, the storage of
    /// its outputs, and for each input the owner and the producer. For a
    /// resource: its explicit and implicit dependencies.
    #[must_use]
    pub fn requirements(&self, node: &NodeRef) -> Vec<NodeRef> {
        let mut candidates: Vec<NodeRef> = Vec::new();
        match node {
            NodeRef::Resource(id) => {
                candidates.extend(
                    self.resources
                        .dependencies_of(id)
                        .into_iter()
                        .map(NodeRef::resource),
                );
            }
            NodeRef::Action(name) => {
                if let Some(action) = self.action(name) {
                    candidates.extend(action.resource.iter().map(NodeRef::resource));
                    candidates.extend(action.resource_dependencies.iter().map(NodeRef::resource));
                    candidates.extend(
                        action
                            .outputs
                            .iter()
                            .filter_map(|o| o.storage.as_ref())
                            .map(NodeRef::resource),
                    );
                    for input in &action.inputs {
                        candidates.extend(self.artifact_owner(input).map(NodeRef::resource));
                        candidates.extend(self.artifacts.producer_of(input).map(NodeRef::action));
                    }
                }
            }
        }

        let mut required: Vec<NodeRef> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if &candidate != node && self.contains(&candidate) && !required.contains(&candidate) {
                required.push(candidate);
            }
        }
        required
    }

    /// Global declaration index of a node.
    #[must_use]
    pub fn declaration_index(&self, node: &NodeRef) -> Option<usize> {
        match node {
            NodeRef::Action(name) => self.action(name).map(|a| a.declared_at),
            NodeRef::Resource(id) => self.resources.get(id).map(|r| r.declared_at),
        }
    }

    /// Every resource and action, ordered by declaration.
    #[must_use]
    pub fn nodes_in_declaration_order(&self) -> Vec<NodeRef> {
        let mut nodes: Vec<(usize, NodeRef)> = self
            .resources
            .iter()
            .map(|r| (r.declared_at, NodeRef::resource(&r.id)))
            .chain(self.actions.iter().map(|a| (a.declared_at, a.node_ref())))
            .collect();
        nodes.sort_by_key(|(declared_at, _)| *declared_at);
        nodes.into_iter().map(|(_, node)| node).collect()
    }

    /// Capability that executes `node`.
    #[must_use]
    pub fn capability_of(&self, node: &NodeRef) -> Option<Capability> {
        match node {
            NodeRef::Action(name) => self.action(name).map(Action::capability),
            NodeRef::Resource(id) => self.resources.get(id).map(|_| Capability::Provision),
        }
    }

    /// Returns a builder pre-populated with this pipeline's declarations.
    ///
    /// Declarations are replayed in their original order, so rebuilding an
    /// unchanged pipeline yields the same plan. The builder's recorded errors
    /// are exactly this pipeline's construction errors; rejections seen while
    /// replaying are not recorded again.
    #[must_use]
    pub fn to_builder(&self) -> PipelineBuilder {
        let mut builder = PipelineBuilder::new(&self.name);

        for artifact in self
            .artifacts
            .iter()
            .filter(|a| a.producer.is_none() || a.storage.is_some())
        {
            let _ = builder.declare_artifact(&artifact.name, artifact.storage.as_deref());
        }

        let mut stage_added = vec![false; self.stages.len()];
        let mut pending_deps: Vec<(&str, &str)> = Vec::new();

        for node in self.nodes_in_declaration_order() {
            match &node {
                NodeRef::Resource(id) => {
                    if let Some(resource) = self.resources.get(id) {
                        pending_deps.extend(
                            resource
                                .explicit_dependencies()
                                .iter()
                                .map(|dep| (resource.id.as_str(), dep.as_str())),
                        );
                        let _ = builder.add_resource(resource.without_dependencies());
                    }
                }
                NodeRef::Action(name) => {
                    let Some(action) = self.action(name) else {
                        continue;
                    };
                    for stage in &self.stages[..=action.stage_index] {
                        if !stage_added[stage.index] {
                            let _ = builder.add_stage_with_barrier(&stage.name, stage.barrier);
                            stage_added[stage.index] = true;
                        }
                    }
                    let _ = builder.add_action(&action.stage, ActionSpec::from_action(action));
                }
            }
        }
        for stage in self.stages.iter().filter(|s| !stage_added[s.index]) {
            let _ = builder.add_stage_with_barrier(&stage.name, stage.barrier);
        }
        for (id, dep) in pending_deps {
            let _ = builder.add_dependency(id, dep);
        }
        builder.restore_errors(self.construction_errors.clone());
        builder
    }
}
