//! Pipeline modelling, validation and planning.
//!
//! This module provides:
//! - The artifact registry and resource dependency graph
//! - The pipeline model and its explicit builder
//! - Declarative YAML/JSON documents
//! - Validation and plan building
//! - Retry policies and failure modes used by the executor

mod artifacts;
mod builder;
mod document;
mod failure_tolerance;
mod model;
mod plan;
mod resources;
mod retry;
mod validation;


pub use artifacts::{Artifact, ArtifactReference, ArtifactRegistry};
pub use builder::{is_valid_name, ActionSpec, PipelineBuilder};
pub use document::{ArtifactDocument, PipelineDocument, ResourceDocument, StageDocument};
pub use failure_tolerance::{FailureCollector, FailureMode, FailureRecord};
pub use model::{Action, OutputDecl, Pipeline, ProviderBinding, Stage};
pub use plan::{build_plan, ExecutionPlan, PlanBatch, PlannedNode};
pub use resources::{ImplicitEdge, ResourceGraph, ResourceNode};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig};
pub use validation::{
    find_resource_cycles, validate, ValidatedPipeline, ValidationReport, ValidationWarning,
};
