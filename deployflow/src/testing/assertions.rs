//! Assertions over plans and run results.

use crate::core::{NodeRef, NodeStatus, SkipReason};
use crate::executor::RunResult;
use crate::pipeline::ExecutionPlan;

/// Asserts the terminal status of a node.
pub fn assert_node_status(result: &RunResult, node: &NodeRef, expected: NodeStatus) {
    let actual = result.status_of(node);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {node} to be {expected}, got {actual:?}"
    );
}

/// Asserts that a node was skipped for the given reason.
pub fn assert_skipped_because(result: &RunResult, node: &NodeRef, expected: &SkipReason) {
    let report = result.node(node);
    assert!(report.is_some(), "Node {node} is not part of the run");
    let reason = report.and_then(|r| r.skip_reason.as_ref());
    assert_eq!(
        reason,
        Some(expected),
        "Expected {node} to be skipped because {expected}, got {reason:?}"
    );
}

/// Asserts that every node succeeded.
pub fn assert_all_succeeded(result: &RunResult) {
    let failed: Vec<String> = result
        .nodes()
        .filter(|n| n.status != NodeStatus::Succeeded)
        .map(|n| format!("{} ({})", n.node_id, n.status))
        .collect();
    assert!(failed.is_empty(), "Expected every node to succeed: {failed:?}");
}

/// Asserts that every edge of the plan runs from an earlier batch to a later one.
pub fn assert_plan_respects_edges(plan: &ExecutionPlan) {
    for (before, after) in plan.edges() {
        let (b, a) = (plan.batch_of(before), plan.batch_of(after));
        assert!(
            matches!((b, a), (Some(b), Some(a)) if b < a),
            "Edge {before} -> {after} violates batch order ({b:?} -> {a:?})"
        );
    }
}
