//! Plan execution.
//!
//! [`PipelineExecutor`] releases the batches of an [`ExecutionPlan`] one at a
//! time, calls the provider bound to each node, and tracks every node through
//! `Pending -> Running -> {Succeeded, Failed}` or `Pending -> Skipped`.
//!
//! [`ExecutionPlan`]: crate::pipeline::ExecutionPlan

mod board;
mod result;
mod runner;
mod store;

pub use board::{NodeRecord, StatusBoard};
pub use result::{overall_status, BatchReport, NodeReport, RunResult, StageReport};
pub use runner::{execute, PipelineExecutor};
pub use store::ArtifactStore;
