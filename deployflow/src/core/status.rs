//! Node, stage and run statuses.

use super::NodeRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a single action or resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting to be scheduled.
    #[default]
    Pending,
    /// A provider call is in flight.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure after all retries.
    Failed,
    /// Never ran.
    Skipped,
}

impl NodeStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// `Pending -> Running -> {Succeeded, Failed}` and `Pending -> Skipped`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Skipped)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a node was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A hard requirement did not succeed.
    UpstreamFailed {
        /// The requirement that blocked this node.
        node: NodeRef,
    },
    /// The stage gating this action did not complete.
    StageIncomplete {
        /// The gating stage.
        stage: String,
    },
    /// A fatal failure halted the run under fail-fast.
    RunHalted,
    /// The run was cancelled before the node started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamFailed { node } => write!(f, "requirement {node} did not succeed"),
            Self::StageIncomplete { stage } => write!(f, "stage '{stage}' did not complete"),
            Self::RunHalted => write!(f, "run halted after a fatal failure"),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// Resolved outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Some actions are not terminal yet.
    #[default]
    Pending,
    /// The barrier policy is satisfied.
    Succeeded,
    /// The barrier policy is not satisfied and at least one action failed.
    Failed,
    /// No action ran.
    Skipped,
}

impl StageOutcome {
    /// Returns true if the stage unblocks the next stage.
    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Self::Succeeded
    }
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every node succeeded.
    Succeeded,
    /// Some node failed but every failure was absorbed by an any-of stage.
    PartiallyFailed,
    /// A fatal failure occurred.
    Failed,
    /// The run was cancelled without a fatal failure.
    Cancelled,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartiallyFailed => write!(f, "partially_failed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_is_terminal() {
        assert!(NodeStatus::Succeeded.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
    }

    #[test]
    fn test_node_status_transitions() {
        assert!(NodeStatus::Pending.can_transition_to(NodeStatus::Running));
        assert!(NodeStatus::Pending.can_transition_to(NodeStatus::Skipped));
        assert!(NodeStatus::Running.can_transition_to(NodeStatus::Failed));
        assert!(!NodeStatus::Pending.can_transition_to(NodeStatus::Succeeded));
        assert!(!NodeStatus::Running.can_transition_to(NodeStatus::Skipped));
        assert!(!NodeStatus::Succeeded.can_transition_to(NodeStatus::Failed));
        assert!(!NodeStatus::Skipped.can_transition_to(NodeStatus::Running));
    }

    #[test]
    fn test_skip_reason_serialize() {
        let reason = SkipReason::UpstreamFailed { node: NodeRef::action("Build") };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"reason": "upstream_failed", "node": "action:Build"})
        );
    }

    #[test]
    fn test_overall_status_display() {
        assert_eq!(OverallStatus::PartiallyFailed.to_string(), "partially_failed");
        assert_eq!(OverallStatus::Failed.to_string(), "failed");
    }
}
