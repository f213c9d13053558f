//! Run summary returned by the executor.

use crate::core::{
    ArtifactHandle, BarrierPolicy, NodeRef, NodeStatus, OverallStatus, ProvisionedResource,
    SkipReason, StageOutcome,
};
use crate::errors::LoadError;
use crate::pipeline::FailureRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final state of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    /// The node.
    pub node_id: NodeRef,
    /// Terminal status.
    pub status: NodeStatus,
    /// Attempts made; zero for skipped nodes.
    pub attempt: u32,
    /// Error of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the node was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// When the node started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached its terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Nodes of one plan batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Batch index.
    pub index: usize,
    /// Node reports in batch order.
    pub nodes: Vec<NodeReport>,
}

/// Resolved outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Barrier policy of the stage.
    pub barrier: BarrierPolicy,
    /// Resolved outcome.
    pub outcome: StageOutcome,
}

/// Summary of a pipeline run, serialisable for audit and replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Pipeline name.
    pub pipeline_id: String,
    /// Unique id of this run.
    pub run_id: String,
    /// Fingerprint of the executed plan.
    pub plan_fingerprint: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-batch node reports.
    pub batches: Vec<BatchReport>,
    /// Per-stage outcomes in pipeline order.
    pub stages: Vec<StageReport>,
    /// Overall status.
    pub overall_status: OverallStatus,
    /// First fatal failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FailureRecord>,
    /// Failures tolerated by any-of stages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub absorbed_failures: Vec<FailureRecord>,
    /// Whether cancellation was requested during the run.
    pub cancelled: bool,
    /// Runtime handles of every produced artifact.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactHandle>,
    /// Provisioned reference of every resource created during the run.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ProvisionedResource>,
}

impl RunResult {
    /// Report of a node.
    #[must_use]
    pub fn node(&self, node: &NodeRef) -> Option<&NodeReport> {
        self.batches
            .iter()
            .flat_map(|b| b.nodes.iter())
            .find(|n| &n.node_id == node)
    }

    /// Status of a node.
    #[must_use]
    pub fn status_of(&self, node: &NodeRef) -> Option<NodeStatus> {
        self.node(node).map(|n| n.status)
    }

    /// Outcome of a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<StageOutcome> {
        self.stages.iter().find(|s| s.name == name).map(|s| s.outcome)
    }

    /// Every node report in plan order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeReport> {
        self.batches.iter().flat_map(|b| b.nodes.iter())
    }

    /// Returns true if every node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.overall_status == OverallStatus::Succeeded
    }

    /// Run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Serialises the result as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Json`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a result previously written by [`RunResult::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Json`] on malformed input.
    pub fn from_json(content: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Overall status from the run's failure facts.
///
/// A fatal failure wins over cancellation, which wins over absorbed failures.
#[must_use]
pub fn overall_status(has_fatal: bool, cancelled: bool, any_failure: bool) -> OverallStatus {
    if has_fatal {
        OverallStatus::Failed
    } else if cancelled {
        OverallStatus::Cancelled
    } else if any_failure {
        OverallStatus::PartiallyFailed
    } else {
        OverallStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> RunResult {
        let now = Utc::now();
        RunResult {
            pipeline_id: "py-pipe".into(),
            run_id: "run-1".into(),
            plan_fingerprint: "abc".into(),
            started_at: now,
            finished_at: now,
            batches: vec![
                BatchReport {
                    index: 0,
                    nodes: vec![NodeReport {
                        node_id: NodeRef::action("Build"),
                        status: NodeStatus::Failed,
                        attempt: 3,
                        error: Some("build call failed: boom".into()),
                        skip_reason: None,
                        started_at: Some(now),
                        finished_at: Some(now),
                    }],
                },
                BatchReport {
                    index: 1,
                    nodes: vec![NodeReport {
                        node_id: NodeRef::action("Deploy"),
                        status: NodeStatus::Skipped,
                        attempt: 0,
                        error: None,
                        skip_reason: Some(SkipReason::UpstreamFailed {
                            node: NodeRef::action("Build"),
                        }),
                        started_at: None,
                        finished_at: Some(now),
                    }],
                },
            ],
            stages: vec![StageReport {
                name: "Build".into(),
                barrier: BarrierPolicy::AllOf,
                outcome: StageOutcome::Failed,
            }],
            overall_status: OverallStatus::Failed,
            first_failure: Some(FailureRecord::new(NodeRef::action("Build"), "boom", 3)),
            absorbed_failures: Vec::new(),
            cancelled: false,
            artifacts: BTreeMap::new(),
            resources: BTreeMap::new(),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let result = sample();
        let json = result.to_json().unwrap();
        assert_eq!(RunResult::from_json(&json).unwrap(), result);
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["pipelineId"], "py-pipe");
        assert_eq!(value["overallStatus"], "failed");
        assert_eq!(value["batches"][0]["nodes"][0]["nodeId"], "action:Build");
        assert_eq!(value["batches"][0]["nodes"][0]["attempt"], 3);
        assert_eq!(value["batches"][1]["nodes"][0]["skipReason"]["reason"], "upstream_failed");
        assert!(value.get("absorbedFailures").is_none());
        assert!(value.get("resources").is_none());
    }

    #[test]
    fn test_provisioned_resources_serialized() {
        let mut result = sample();
        result
            .resources
            .insert("Bucket".into(), ProvisionedResource::new("arn:aws:s3:::bucket"));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["resources"]["Bucket"]["physical_id"], "arn:aws:s3:::bucket");
        assert_eq!(RunResult::from_json(&result.to_json().unwrap()).unwrap(), result);
    }

    #[test]
    fn test_lookups() {
        let result = sample();
        assert_eq!(result.status_of(&NodeRef::action("Deploy")), Some(NodeStatus::Skipped));
        assert_eq!(result.stage("Build"), Some(StageOutcome::Failed));
        assert_eq!(result.nodes().count(), 2);
        assert!(!result.is_success());
        assert_eq!(result.duration_ms(), 0);
    }

    #[test]
    fn test_overall_status_precedence() {
        assert_eq!(overall_status(true, true, true), OverallStatus::Failed);
        assert_eq!(overall_status(false, true, true), OverallStatus::Cancelled);
        assert_eq!(overall_status(false, false, true), OverallStatus::PartiallyFailed);
        assert_eq!(overall_status(false, false, false), OverallStatus::Succeeded);
    }
}
