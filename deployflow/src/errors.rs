//! Error types for the deployflow engine.
//!
//! Errors fall into four groups:
//! - [`SpecificationError`]: problems in the pipeline description, detected
//!   before anything runs and always reported with the offending identifiers
//! - [`ProviderError`]: a failed or timed-out provider call, retried locally
//! - [`ExecutorError`] / [`PlanningInvariantError`]: the executor refused to
//!   start, or the planner hit a state validation should have excluded
//! - [`LoadError`]: a document or configuration file could not be read

use crate::core::{Capability, NodeRef, NodeStatus};
use crate::pipeline::ValidationReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployflowError {
    /// The pipeline failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationReport),

    /// A single specification error from a builder call.
    #[error("{0}")]
    Specification(#[from] SpecificationError),

    /// The planner reached an impossible state.
    #[error("{0}")]
    Planning(#[from] PlanningInvariantError),

    /// The executor refused to run the plan.
    #[error("{0}")]
    Executor(#[from] ExecutorError),

    /// A document or configuration could not be loaded.
    #[error("{0}")]
    Load(#[from] LoadError),
}

/// Diagnostic metadata attached to specification errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Stable error code (e.g. "SPEC-003-FORWARD_REF").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ErrorInfo {
    /// Creates error info without a hint.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// An error in the pipeline description.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum SpecificationError {
    /// Two actions declare the same output artifact.
    #[error("artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    DuplicateArtifact {
        /// The artifact name.
        artifact: String,
        /// The first producer.
        first: String,
        /// The conflicting producer.
        second: String,
    },

    /// An action consumes an artifact nobody declared.
    #[error("action '{consumer}' consumes unknown artifact '{artifact}'")]
    UnknownArtifact {
        /// The artifact name.
        artifact: String,
        /// The consuming action.
        consumer: String,
    },

    /// An action consumes an artifact produced in its own or a later stage.
    #[error(
        "action '{consumer}' (stage '{consumer_stage}') consumes '{artifact}' produced by \
         '{producer}' in stage '{producer_stage}', which does not run earlier"
    )]
    ForwardReference {
        /// The artifact name.
        artifact: String,
        /// The consuming action.
        consumer: String,
        /// Stage of the consumer.
        consumer_stage: String,
        /// The producing action.
        producer: String,
        /// Stage of the producer.
        producer_stage: String,
    },

    /// An artifact was declared but no action produces it.
    #[error("artifact '{artifact}' is declared but never produced")]
    UnproducedArtifact {
        /// The artifact name.
        artifact: String,
    },

    /// A reference to a resource node that is not registered.
    #[error("'{referenced_by}' references unknown resource node '{node}'")]
    UnknownNode {
        /// The missing resource id.
        node: String,
        /// Who referenced it.
        referenced_by: String,
    },

    /// A resource node depends on itself.
    #[error("resource node '{node}' cannot depend on itself")]
    SelfDependency {
        /// The resource id.
        node: String,
    },

    /// The combined dependency graph has a cycle.
    #[error("dependency cycle: {}", format_cycle(cycle))]
    CyclicDependency {
        /// The cycle members, in edge order.
        cycle: Vec<NodeRef>,
    },

    /// Two stages share a name.
    #[error("stage '{stage}' is declared more than once")]
    DuplicateStage {
        /// The stage name.
        stage: String,
    },

    /// Two actions share a name.
    #[error("action '{action}' is declared more than once")]
    DuplicateAction {
        /// The action name.
        action: String,
    },

    /// Two resource nodes share an id.
    #[error("resource node '{resource}' is declared more than once")]
    DuplicateResource {
        /// The resource id.
        resource: String,
    },

    /// An action was added to a stage that does not exist.
    #[error("action '{action}' targets unknown stage '{stage}'")]
    UnknownStage {
        /// The stage name.
        stage: String,
        /// The action being added.
        action: String,
    },

    /// A name does not satisfy the naming rule.
    #[error("invalid {kind} name '{name}'")]
    InvalidName {
        /// What was being named (stage, action, artifact, resource).
        kind: String,
        /// The rejected name.
        name: String,
    },

    /// An action needs a capability but none was given or implied.
    #[error("action '{action}' of kind '{kind}' has no provider binding")]
    MissingBinding {
        /// The action name.
        action: String,
        /// The action kind.
        kind: String,
    },

    /// A store-write or deploy action has nothing to write or deploy.
    #[error("action '{action}' uses capability '{capability}' but consumes no artifact")]
    MissingInput {
        /// The action name.
        action: String,
        /// The capability that needs an input.
        capability: Capability,
    },

    /// The pipeline has no stages.
    #[error("pipeline '{pipeline}' has no stages")]
    EmptyPipeline {
        /// The pipeline name.
        pipeline: String,
    },
}

fn format_cycle(cycle: &[NodeRef]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

impl SpecificationError {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateArtifact { .. } => "SPEC-001-DUPLICATE_ARTIFACT",
            Self::UnknownArtifact { .. } => "SPEC-002-UNKNOWN_ARTIFACT",
            Self::ForwardReference { .. } => "SPEC-003-FORWARD_REF",
            Self::UnproducedArtifact { .. } => "SPEC-004-UNPRODUCED_ARTIFACT",
            Self::UnknownNode { .. } => "SPEC-005-UNKNOWN_NODE",
            Self::SelfDependency { .. } => "SPEC-006-SELF_DEP",
            Self::CyclicDependency { .. } => "SPEC-007-CYCLE",
            Self::DuplicateStage { .. } => "SPEC-008-DUPLICATE_STAGE",
            Self::DuplicateAction { .. } => "SPEC-009-DUPLICATE_ACTION",
            Self::DuplicateResource { .. } => "SPEC-010-DUPLICATE_RESOURCE",
            Self::UnknownStage { .. } => "SPEC-011-UNKNOWN_STAGE",
            Self::InvalidName { .. } => "SPEC-012-INVALID_NAME",
            Self::MissingBinding { .. } => "SPEC-013-MISSING_BINDING",
            Self::EmptyPipeline { .. } => "SPEC-014-EMPTY",
            Self::MissingInput { .. } => "SPEC-015-MISSING_INPUT",
        }
    }

    /// Returns diagnostic info with a fix hint.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        let hint = match self {
            Self::DuplicateArtifact { .. } => {
                "Rename one of the outputs; every artifact has exactly one producer."
            }
            Self::UnknownArtifact { .. } => {
                "Declare the artifact as an output of an action in an earlier stage."
            }
            Self::ForwardReference { .. } => {
                "Move the producing action to an earlier stage, or consume a different artifact."
            }
            Self::UnproducedArtifact { .. } => {
                "Add an action that outputs the artifact, or remove the declaration."
            }
            Self::UnknownNode { .. } => "Declare the resource node before referencing it.",
            Self::SelfDependency { .. } => "Remove the dependency on itself.",
            Self::CyclicDependency { .. } => "Remove one of the dependencies in the cycle to break it.",
            Self::DuplicateStage { .. }
            | Self::DuplicateAction { .. }
            | Self::DuplicateResource { .. } => "Names must be unique within a pipeline.",
            Self::UnknownStage { .. } => "Add the stage before adding actions to it.",
            Self::InvalidName { .. } => {
                "Use 1-100 characters from [A-Za-z0-9@._-], starting with a letter or digit."
            }
            Self::MissingBinding { .. } => "Give the action an explicit provider binding.",
            Self::EmptyPipeline { .. } => "Add at least one stage to the pipeline.",
            Self::MissingInput { .. } => "Add the artifact to write or deploy as an input.",
        };

        ErrorInfo::new(self.code(), self.to_string()).with_fix_hint(hint)
    }
}

/// Error returned by a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider reported a failure.
    #[error("{capability} call failed: {message}")]
    Call {
        /// The capability that was invoked.
        capability: Capability,
        /// Provider message.
        message: String,
        /// Whether another attempt may succeed.
        retryable: bool,
    },

    /// The call did not finish within the configured timeout.
    #[error("{capability} call timed out after {timeout_ms} ms")]
    Timeout {
        /// The capability that was invoked.
        capability: Capability,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Any other provider-side error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    /// Creates a retryable call failure.
    #[must_use]
    pub fn call(capability: Capability, message: impl Into<String>) -> Self {
        Self::Call {
            capability,
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a failure that must not be retried.
    #[must_use]
    pub fn permanent(capability: Capability, message: impl Into<String>) -> Self {
        Self::Call {
            capability,
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Call { retryable, .. } => *retryable,
            Self::Timeout { .. } | Self::Other(_) => true,
        }
    }
}

/// Raised when topological extraction stalls on a validated pipeline.
///
/// This indicates a bug in the engine, never a user error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("planning invariant violated: {message} (remaining: {})", format_nodes(remaining))]
pub struct PlanningInvariantError {
    /// What went wrong.
    pub message: String,
    /// Nodes that could not be placed.
    pub remaining: Vec<NodeRef>,
}

impl PlanningInvariantError {
    /// Creates a new planning invariant error.
    #[must_use]
    pub fn new(message: impl Into<String>, remaining: Vec<NodeRef>) -> Self {
        Self {
            message: message.into(),
            remaining,
        }
    }

    /// Returns the equivalent specification error for reporting the stall as a cycle.
    #[must_use]
    pub fn as_cycle(&self) -> SpecificationError {
        SpecificationError::CyclicDependency {
            cycle: self.remaining.clone(),
        }
    }
}

fn format_nodes(nodes: &[NodeRef]) -> String {
    nodes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Errors that stop the executor before any node runs.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The plan uses a capability for which no provider was supplied.
    #[error("no provider registered for capability '{capability}' (required by {node})")]
    MissingProvider {
        /// The missing capability.
        capability: Capability,
        /// The first node requiring it.
        node: NodeRef,
    },

    /// The plan references a node the pipeline does not contain.
    #[error("plan references unknown node {0}")]
    UnknownPlanNode(NodeRef),

    /// An internal planning invariant was violated.
    #[error(transparent)]
    PlanningInvariant(#[from] PlanningInvariantError),
}

/// A node status change the state machine does not allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The node is not tracked by the status board.
    #[error("node {0} is not part of this run")]
    UnknownNode(NodeRef),

    /// The transition is not legal from the current status.
    #[error("illegal transition of {node} from {from} to {to}")]
    Illegal {
        /// The node.
        node: NodeRef,
        /// Current status.
        from: NodeStatus,
        /// Requested status.
        to: NodeStatus,
    },
}

/// Errors raised while loading documents and configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    /// YAML could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON could not be parsed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file extension is not recognised.
    #[error("unsupported document format: '{0}' (expected .yaml, .yml or .json)")]
    UnsupportedFormat(String),
}
