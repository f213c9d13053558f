//! Typed lifecycle events of a pipeline run.

use crate::core::{NodeRef, OverallStatus, SkipReason};
use serde::Serialize;

/// A lifecycle event emitted by the executor.
///
/// Serialises with an `event` tag holding the dotted event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum RunEvent {
    /// The run began.
    #[serde(rename = "run.started")]
    RunStarted {
        /// Pipeline name.
        pipeline: String,
        /// Run id.
        run_id: String,
        /// Number of planned batches.
        batches: usize,
        /// Plan fingerprint.
        fingerprint: String,
    },
    /// A batch was released.
    #[serde(rename = "batch.started")]
    BatchStarted {
        /// Run id.
        run_id: String,
        /// Batch index.
        index: usize,
        /// Nodes of the batch.
        nodes: Vec<NodeRef>,
    },
    /// A node transitioned to running.
    #[serde(rename = "node.started")]
    NodeStarted {
        /// Run id.
        run_id: String,
        /// The node.
        node: NodeRef,
        /// 1-based attempt.
        attempt: u32,
    },
    /// A failed attempt will be retried.
    #[serde(rename = "node.retrying")]
    NodeRetrying {
        /// Run id.
        run_id: String,
        /// The node.
        node: NodeRef,
        /// The attempt that failed.
        attempt: u32,
        /// Backoff before the next attempt.
        delay_ms: u64,
        /// Error of the failed attempt.
        error: String,
    },
    /// A node succeeded.
    #[serde(rename = "node.succeeded")]
    NodeSucceeded {
        /// Run id.
        run_id: String,
        /// The node.
        node: NodeRef,
        /// Attempts made.
        attempts: u32,
    },
    /// A node failed after all attempts.
    #[serde(rename = "node.failed")]
    NodeFailed {
        /// Run id.
        run_id: String,
        /// The node.
        node: NodeRef,
        /// Attempts made.
        attempts: u32,
        /// Error of the last attempt.
        error: String,
    },
    /// A node was skipped.
    #[serde(rename = "node.skipped")]
    NodeSkipped {
        /// Run id.
        run_id: String,
        /// The node.
        node: NodeRef,
        /// Why it was skipped.
        skip_reason: SkipReason,
    },
    /// A stage resolved as succeeded.
    #[serde(rename = "stage.completed")]
    StageCompleted {
        /// Run id.
        run_id: String,
        /// Stage name.
        stage: String,
    },
    /// A stage resolved as failed.
    #[serde(rename = "stage.failed")]
    StageFailed {
        /// Run id.
        run_id: String,
        /// Stage name.
        stage: String,
    },
    /// The run finished.
    #[serde(rename = "run.completed")]
    RunCompleted {
        /// Run id.
        run_id: String,
        /// Final status.
        status: OverallStatus,
        /// Duration in milliseconds.
        duration_ms: i64,
    },
}

impl RunEvent {
    /// Dotted event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::BatchStarted { .. } => "batch.started",
            Self::NodeStarted { .. } => "node.started",
            Self::NodeRetrying { .. } => "node.retrying",
            Self::NodeSucceeded { .. } => "node.succeeded",
            Self::NodeFailed { .. } => "node.failed",
            Self::NodeSkipped { .. } => "node.skipped",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::RunCompleted { .. } => "run.completed",
        }
    }

    /// JSON payload of the event, including the `event` tag.
    #[must_use]
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
