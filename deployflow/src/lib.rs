//! # Deployflow
//!
//! A declarative deployment pipeline engine.
//!
//! Deployflow models a deployment as ordered stages of actions that pass
//! named artifacts to each other, plus provisioned resource nodes with their
//! own ordering. It provides:
//!
//! - **Validation**: every specification problem is reported at once, before
//!   anything runs
//! - **Planning**: a deterministic layering of actions and resources into
//!   batches
//! - **Execution**: batches run in order, nodes within a batch run
//!   concurrently against pluggable providers, with retries, stage barriers
//!   and cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let mut builder = PipelineBuilder::new("app");
//! builder.add_stage("Source")?;
//! builder.add_stage("Build")?;
//! builder.add_stage("Deploy")?;
//! builder.add_action("Source", ActionSpec::source("Checkout").output("SourceOutput"))?;
//! builder.add_action("Build", ActionSpec::build("Compile").input("SourceOutput").output("Bundle"))?;
//! builder.add_action("Deploy", ActionSpec::deploy("Release").input("Bundle"))?;
//!
//! let validated = ValidatedPipeline::new(builder.build())?;
//! let plan = build_plan(&validated)?;
//! let result = PipelineExecutor::new(providers).execute(&plan).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ExecutorConfig;
    pub use crate::core::{
        ActionKind, ArtifactHandle, BarrierPolicy, Capability, NodeRef, NodeStatus,
        OverallStatus, ResourceKind, SkipReason, StageOutcome,
    };
    pub use crate::errors::{
        DeployflowError, ErrorInfo, ExecutorError, LoadError, PlanningInvariantError,
        ProviderError, SpecificationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{PipelineExecutor, RunResult};
    pub use crate::pipeline::{
        build_plan, validate, ActionSpec, ExecutionPlan, FailureMode, Pipeline, PipelineBuilder,
        PipelineDocument, ProviderBinding, ResourceNode, RetryConfig, ValidatedPipeline,
        ValidationReport,
    };
    pub use crate::providers::{
        BuildProvider, DeployProvider, ProviderSet, ResourceProvisioner, SourceProvider,
        StorageProvider,
    };
}
