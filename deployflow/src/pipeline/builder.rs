//! Explicit pipeline builder.
//!
//! Every declaration goes through a builder value passed by the caller; there
//! is no implicit scope collecting resources. Rejected declarations are
//! returned to the caller and also recorded, so the built [`Pipeline`] carries
//! them into validation.

use super::artifacts::ArtifactRegistry;
use super::model::{Action, OutputDecl, Pipeline, ProviderBinding, Stage};
use super::resources::{ResourceGraph, ResourceNode};
use super::retry::RetryConfig;
use crate::core::{ActionKind, BarrierPolicy};
use crate::errors::SpecificationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9@._-]{0,99}$").ok());

/// Returns true if `name` is a valid stage, action, artifact or resource name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name))
}

fn check_name(kind: &str, name: &str) -> Result<(), SpecificationError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(SpecificationError::InvalidName {
            kind: kind.to_string(),
            name: name.to_string(),
        })
    }
}

/// Declaration of an action to add to a stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Pipeline-unique name.
    pub name: String,
    /// Action kind.
    #[serde(default)]
    pub kind: ActionKind,
    /// Input artifact names.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output declarations.
    #[serde(default)]
    pub outputs: Vec<OutputDecl>,
    /// Provider binding; derived from the kind when absent.
    #[serde(default, rename = "provider", skip_serializing_if = "Option::is_none")]
    pub binding: Option<ProviderBinding>,
    /// Resource node the action operates on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Explicit resource dependencies.
    #[serde(default)]
    pub resource_dependencies: Vec<String>,
    /// Retry policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Per-attempt timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ActionSpec {
    /// Creates a spec for an action of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    /// Creates a source action.
    #[must_use]
    pub fn source(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Source)
    }

    /// Creates a build action.
    #[must_use]
    pub fn build(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Build)
    }

    /// Creates a deploy action.
    #[must_use]
    pub fn deploy(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Deploy)
    }

    /// Creates a generic action. It needs an explicit binding.
    #[must_use]
    pub fn generic(name: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Generic)
    }

    /// Adds an input artifact.
    #[must_use]
    pub fn input(mut self, artifact: impl Into<String>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    /// Adds an output artifact.
    #[must_use]
    pub fn output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(OutputDecl::new(artifact));
        self
    }

    /// Adds an output artifact stored in a resource node.
    #[must_use]
    pub fn output_stored_in(mut self, artifact: impl Into<String>, storage: impl Into<String>) -> Self {
        self.outputs.push(OutputDecl::new(artifact).stored_in(storage));
        self
    }

    /// Sets the provider binding.
    #[must_use]
    pub fn binding(mut self, binding: ProviderBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Sets the resource node the action operates on.
    #[must_use]
    pub fn resource(mut self, id: impl Into<String>) -> Self {
        self.resource = Some(id.into());
        self
    }

    /// Adds an explicit resource dependency.
    #[must_use]
    pub fn depends_on_resource(mut self, id: impl Into<String>) -> Self {
        self.resource_dependencies.push(id.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub(crate) fn from_action(action: &Action) -> Self {
        Self {
            name: action.name.clone(),
            kind: action.kind,
            inputs: action.inputs.clone(),
            outputs: action.outputs.clone(),
            binding: Some(action.binding.clone()),
            resource: action.resource.clone(),
            resource_dependencies: action.resource_dependencies.clone(),
            retry: action.retry.clone(),
            timeout_ms: action.timeout_ms,
        }
    }
}

/// Builder for [`Pipeline`] values.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    actions: Vec<Action>,
    action_index: HashMap<String, usize>,
    artifacts: ArtifactRegistry,
    resources: ResourceGraph,
    errors: Vec<SpecificationError>,
    next_declaration: usize,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn record<T>(&mut self, result: Result<T, SpecificationError>) -> Result<T, SpecificationError> {
        if let Err(err) = &result {
            tracing::debug!(pipeline = %self.name, error = %err, "Rejected declaration");
            self.errors.push(err.clone());
        }
        result
    }

    fn next_index(&mut self) -> usize {
        let idx = self.next_declaration;
        self.next_declaration += 1;
        idx
    }

    pub(crate) fn restore_errors(&mut self, errors: Vec<SpecificationError>) {
        self.errors = errors;
    }

    /// Appends an all-of stage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or `DuplicateStage`.
    pub fn add_stage(&mut self, name: &str) -> Result<(), SpecificationError> {
        self.add_stage_with_barrier(name, BarrierPolicy::AllOf)
    }

    /// Appends a stage with the given barrier policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or `DuplicateStage`.
    pub fn add_stage_with_barrier(
        &mut self,
        name: &str,
        barrier: BarrierPolicy,
    ) -> Result<(), SpecificationError> {
        let result = check_name("stage", name).and_then(|()| {
            if self.stages.iter().any(|s| s.name == name) {
                Err(SpecificationError::DuplicateStage {
                    stage: name.to_string(),
                })
            } else {
                Ok(())
            }
        });
        self.record(result)?;

        self.stages.push(Stage {
            name: name.to_string(),
            index: self.stages.len(),
            barrier,
            actions: Vec::new(),
        });
        Ok(())
    }

    /// Registers a resource node.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or `DuplicateResource`.
    pub fn add_resource(&mut self, mut node: ResourceNode) -> Result<(), SpecificationError> {
        self.record(check_name("resource", &node.id))?;
        node.declared_at = self.next_declaration;
        let result = self.resources.add_node(node);
        self.record(result)?;
        self.next_index();
        Ok(())
    }

    /// Records that resource `id` must be created after `depends_on`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` or `SelfDependency`.
    pub fn add_dependency(&mut self, id: &str, depends_on: &str) -> Result<(), SpecificationError> {
        let result = self.resources.add_dependency(id, depends_on);
        self.record(result)
    }

    /// Declares an artifact up front, optionally binding its storage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`.
    pub fn declare_artifact(&mut self, name: &str, storage: Option<&str>) -> Result<(), SpecificationError> {
        self.record(check_name("artifact", name))?;
        self.artifacts.declare_artifact(name, storage);
        Ok(())
    }

    /// Adds an action to an existing stage.
    ///
    /// Outputs are registered in order. A duplicate output does not stop the
    /// action from being added; it is reported by validation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`, `UnknownStage`, `DuplicateAction`,
    /// `MissingBinding` or `DuplicateArtifact`.
    pub fn add_action(&mut self, stage: &str, spec: ActionSpec) -> Result<(), SpecificationError> {
        let checked = self.check_action(stage, &spec);
        let (stage_index, binding) = self.record(checked)?;

        let declared_at = self.next_index();
        let name = spec.name.clone();

        let mut duplicate = None;
        for output in &spec.outputs {
            if let Err(err) = self
                .artifacts
                .declare_output(&name, &output.name, output.storage.as_deref())
            {
                if duplicate.is_none() {
                    duplicate = Some(err);
                }
            }
        }
        for input in &spec.inputs {
            self.artifacts.declare_input(&name, input);
        }

        self.stages[stage_index].actions.push(name.clone());
        self.action_index.insert(name.clone(), self.actions.len());
        self.actions.push(Action {
            name,
            stage: stage.to_string(),
            stage_index,
            kind: spec.kind,
            inputs: spec.inputs,
            outputs: spec.outputs,
            binding,
            resource: spec.resource,
            resource_dependencies: spec.resource_dependencies,
            retry: spec.retry,
            timeout_ms: spec.timeout_ms,
            declared_at,
        });

        duplicate.map_or(Ok(()), Err)
    }

    fn check_action(
        &self,
        stage: &str,
        spec: &ActionSpec,
    ) -> Result<(usize, ProviderBinding), SpecificationError> {
        check_name("action", &spec.name)?;
        for artifact in spec.inputs.iter().chain(spec.outputs.iter().map(|o| &o.name)) {
            check_name("artifact", artifact)?;
        }

        let stage_index = self
            .stages
            .iter()
            .position(|s| s.name == stage)
            .ok_or_else(|| SpecificationError::UnknownStage {
                stage: stage.to_string(),
                action: spec.name.clone(),
            })?;

        if self.action_index.contains_key(&spec.name) {
            return Err(SpecificationError::DuplicateAction {
                action: spec.name.clone(),
            });
        }

        let binding = spec
            .binding
            .clone()
            .or_else(|| ProviderBinding::default_for(spec.kind, &spec.name))
            .ok_or_else(|| SpecificationError::MissingBinding {
                action: spec.name.clone(),
                kind: spec.kind.to_string(),
            })?;

        Ok((stage_index, binding))
    }

    /// Errors recorded so far.
    #[must_use]
    pub fn errors(&self) -> &[SpecificationError] {
        &self.errors
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the pipeline, deriving implicit resource edges.
    ///
    /// Building never fails; recorded errors travel with the pipeline and are
    /// reported by validation.
    #[must_use]
    pub fn build(mut self) -> Pipeline {
        self.resources.derive_implicit_edges(&self.actions, &self.artifacts);
        Pipeline {
            name: self.name,
            stages: self.stages,
            actions: self.actions,
            action_index: self.action_index,
            artifacts: self.artifacts,
            resources: self.resources,
            construction_errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_name_rule() {
        assert!(is_valid_name("S3Source"));
        assert!(is_valid_name("hello-cdk.bundle@v1_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(&"a".repeat(101)));
        assert!(is_valid_name(&"a".repeat(100)));
    }

    #[test]
    fn test_add_action_to_unknown_stage() {
        let mut builder = PipelineBuilder::new("p");
        let err = builder
            .add_action("Build", ActionSpec::build("Compile"))
            .unwrap_err();
        assert_eq!(
            err,
            SpecificationError::UnknownStage {
                stage: "Build".into(),
                action: "Compile".into()
            }
        );
        assert_eq!(builder.errors(), [err]);
    }

    #[test]
    fn test_duplicate_stage_and_action() {
        let mut builder = PipelineBuilder::new("p");
        builder.add_stage("Source").unwrap();
        assert!(matches!(
            builder.add_stage("Source"),
            Err(SpecificationError::DuplicateStage { .. })
        ));

        builder.add_action("Source", ActionSpec::source("Fetch")).unwrap();
        assert!(matches!(
            builder.add_action("Source", ActionSpec::source("Fetch")),
            Err(SpecificationError::DuplicateAction { .. })
        ));

        let pipeline = builder.build();
        assert_eq!(pipeline.actions().len(), 1);
        assert_eq!(pipeline.construction_errors().len(), 2);
    }

    #[test]
    fn test_generic_action_requires_binding() {
        let mut builder = PipelineBuilder::new("p");
        builder.add_stage("Upload").unwrap();
        assert!(matches!(
            builder.add_action("Upload", ActionSpec::generic("Push")),
            Err(SpecificationError::MissingBinding { .. })
        ));
        builder
            .add_action(
                "Upload",
                ActionSpec::generic("Write").binding(ProviderBinding::store_write("bundle.zip")),
            )
            .unwrap();
        assert_eq!(builder.build().actions()[0].name, "Write");
    }

    #[test]
    fn test_duplicate_output_keeps_action_and_is_not_recorded() {
        let mut builder = PipelineBuilder::new("p");
        builder.add_stage("Build").unwrap();
        builder
            .add_action("Build", ActionSpec::build("A").output("Out"))
            .unwrap();
        let err = builder
            .add_action("Build", ActionSpec::build("B").output("Out"))
            .unwrap_err();
        assert!(matches!(err, SpecificationError::DuplicateArtifact { .. }));

        let pipeline = builder.build();
        assert!(pipeline.action("B").is_some());
        assert!(pipeline.construction_errors().is_empty());
        assert_eq!(
            pipeline.artifacts().get("Out").unwrap().conflicting_producers(),
            ["B".to_string()]
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut builder = PipelineBuilder::new("p");
        assert!(builder.add_stage("bad stage").is_err());
        assert!(builder
            .add_resource(ResourceNode::new("", ResourceKind::Bucket))
            .is_err());
        builder.add_stage("Build").unwrap();
        assert!(matches!(
            builder.add_action("Build", ActionSpec::build("Compile").output("out put")),
            Err(SpecificationError::InvalidName { ref kind, .. }) if kind == "artifact"
        ));
        assert_eq!(builder.errors().len(), 3);
    }

    #[test]
    fn test_declaration_indices_are_global() {
        let mut builder = PipelineBuilder::new("p");
        builder.add_stage("Source").unwrap();
        builder.add_action("Source", ActionSpec::source("Fetch")).unwrap();
        builder.add_resource(ResourceNode::new("Bucket", ResourceKind::Bucket)).unwrap();
        assert!(builder
            .add_resource(ResourceNode::new("Bucket", ResourceKind::Bucket))
            .is_err());
        builder.add_resource(ResourceNode::new("Env", ResourceKind::Environment)).unwrap();

        let pipeline = builder.build();
        assert_eq!(pipeline.action("Fetch").unwrap().declared_at, 0);
        assert_eq!(pipeline.resources().get("Bucket").unwrap().declared_at, 1);
        assert_eq!(pipeline.resources().get("Env").unwrap().declared_at, 2);
    }
}
