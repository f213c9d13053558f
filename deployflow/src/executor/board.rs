//! Per-node status tracking for a run.

use crate::core::{BarrierPolicy, NodeRef, NodeStatus, SkipReason, StageOutcome};
use crate::errors::TransitionError;
use crate::pipeline::Stage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Mutable state of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    /// Current status.
    pub status: NodeStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Error of the last attempt, once failed.
    pub error: Option<String>,
    /// Why the node was skipped.
    pub skip_reason: Option<SkipReason>,
    /// When the node started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status of every node of a run, each behind its own lock.
///
/// Every transition is checked against [`NodeStatus::can_transition_to`]
/// while the node's lock is held, so a status is written at most once per
/// transition.
#[derive(Debug)]
pub struct StatusBoard {
    records: HashMap<NodeRef, Mutex<NodeRecord>>,
}

impl StatusBoard {
    /// Creates a board with every node pending.
    pub fn new(nodes: impl IntoIterator<Item = NodeRef>) -> Self {
        Self {
            records: nodes
                .into_iter()
                .map(|node| (node, Mutex::new(NodeRecord::default())))
                .collect(),
        }
    }

    /// Current status of a node.
    #[must_use]
    pub fn status(&self, node: &NodeRef) -> Option<NodeStatus> {
        self.records.get(node).map(|r| r.lock().status)
    }

    /// Copy of a node's record.
    #[must_use]
    pub fn record(&self, node: &NodeRef) -> Option<NodeRecord> {
        self.records.get(node).map(|r| r.lock().clone())
    }

    /// `Pending -> Running`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the node is not pending.
    pub fn start(&self, node: &NodeRef) -> Result<(), TransitionError> {
        self.transition(node, NodeStatus::Running, |record| {
            record.started_at = Some(Utc::now());
        })
    }

    /// Records the number of the attempt now in flight.
    pub fn note_attempt(&self, node: &NodeRef, attempt: u32) {
        if let Some(record) = self.records.get(node) {
            let mut record = record.lock();
            if record.status == NodeStatus::Running {
                record.attempts = attempt;
            }
        }
    }

    /// `Running -> Succeeded`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the node is not running.
    pub fn succeed(&self, node: &NodeRef, attempts: u32) -> Result<(), TransitionError> {
        self.transition(node, NodeStatus::Succeeded, |record| {
            record.attempts = attempts;
            record.finished_at = Some(Utc::now());
        })
    }

    /// `Running -> Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the node is not running.
    pub fn fail(
        &self,
        node: &NodeRef,
        attempts: u32,
        error: impl Into<String>,
    ) -> Result<(), TransitionError> {
        let error = error.into();
        self.transition(node, NodeStatus::Failed, |record| {
            record.attempts = attempts;
            record.error = Some(error);
            record.finished_at = Some(Utc::now());
        })
    }

    /// `Pending -> Skipped`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the node is not pending.
    pub fn skip(&self, node: &NodeRef, reason: SkipReason) -> Result<(), TransitionError> {
        self.transition(node, NodeStatus::Skipped, |record| {
            record.skip_reason = Some(reason);
            record.finished_at = Some(Utc::now());
        })
    }

    fn transition(
        &self,
        node: &NodeRef,
        next: NodeStatus,
        apply: impl FnOnce(&mut NodeRecord),
    ) -> Result<(), TransitionError> {
        let cell = self
            .records
            .get(node)
            .ok_or_else(|| TransitionError::UnknownNode(node.clone()))?;
        let mut record = cell.lock();
        if !record.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                node: node.clone(),
                from: record.status,
                to: next,
            });
        }
        record.status = next;
        apply(&mut record);
        Ok(())
    }

    /// The failed node a node's outcome traces back to.
    ///
    /// A failed node is its own root. A node skipped with `UpstreamFailed` is
    /// followed to its blocker. Any other status has no root failure.
    #[must_use]
    pub fn root_failure(&self, node: &NodeRef) -> Option<NodeRef> {
        let mut current = node.clone();
        for _ in 0..=self.records.len() {
            let record = self.record(&current)?;
            match (record.status, record.skip_reason) {
                (NodeStatus::Failed, _) => return Some(current),
                (NodeStatus::Skipped, Some(SkipReason::UpstreamFailed { node })) => current = node,
                _ => return None,
            }
        }
        None
    }

    /// Root failures of a stage's actions, deduplicated, in declaration order.
    #[must_use]
    pub fn stage_failures(&self, stage: &Stage) -> Vec<NodeRef> {
        let mut roots: Vec<NodeRef> = Vec::new();
        for name in &stage.actions {
            if let Some(root) = self.root_failure(&NodeRef::action(name)) {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }
        roots
    }

    /// Resolves a stage from the statuses of its actions.
    ///
    /// `Pending` while any action is not terminal. Otherwise `Succeeded` if the
    /// barrier is met, `Failed` if an action failed or was skipped because of
    /// a failure, else `Skipped`. A stage without actions is `Skipped`.
    #[must_use]
    pub fn stage_outcome(&self, stage: &Stage) -> StageOutcome {
        if stage.actions.is_empty() {
            return StageOutcome::Skipped;
        }

        let statuses: Vec<NodeStatus> = stage
            .actions
            .iter()
            .map(|name| self.status(&NodeRef::action(name)).unwrap_or_default())
            .collect();
        if statuses.iter().any(|s| !s.is_terminal()) {
            return StageOutcome::Pending;
        }

        let succeeded = statuses.iter().filter(|s| **s == NodeStatus::Succeeded).count();
        let barrier_met = match stage.barrier {
            BarrierPolicy::AllOf => succeeded == statuses.len(),
            BarrierPolicy::AnyOf => succeeded > 0,
        };

        if barrier_met {
            StageOutcome::Succeeded
        } else if !self.stage_failures(stage).is_empty() {
            StageOutcome::Failed
        } else {
            StageOutcome::Skipped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stage(barrier: BarrierPolicy, actions: &[&str]) -> Stage {
        Stage {
            name: "Source".into(),
            index: 0,
            barrier,
            actions: actions.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_legal_lifecycle() {
        let node = NodeRef::action("Build");
        let board = StatusBoard::new([node.clone()]);

        board.start(&node).unwrap();
        board.note_attempt(&node, 2);
        board.fail(&node, 2, "boom").unwrap();

        let record = board.record(&node).unwrap();
        assert_eq!(record.status, NodeStatus::Failed);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_second_terminal_transition_rejected() {
        let node = NodeRef::action("Deploy");
        let board = StatusBoard::new([node.clone()]);

        board.skip(&node, SkipReason::RunHalted).unwrap();
        let err = board.start(&node).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                node: node.clone(),
                from: NodeStatus::Skipped,
                to: NodeStatus::Running,
            }
        );
        assert_eq!(board.status(&node), Some(NodeStatus::Skipped));
    }

    #[test]
    fn test_unknown_node() {
        let board = StatusBoard::new(Vec::<NodeRef>::new());
        let node = NodeRef::resource("Bucket");
        assert_eq!(board.start(&node), Err(TransitionError::UnknownNode(node)));
    }

    #[test]
    fn test_stage_outcomes() {
        let a = NodeRef::action("A");
        let b = NodeRef::action("B");
        let board = StatusBoard::new([a.clone(), b.clone()]);
        let any_of = stage(BarrierPolicy::AnyOf, &["A", "B"]);
        let all_of = stage(BarrierPolicy::AllOf, &["A", "B"]);

        assert_eq!(board.stage_outcome(&any_of), StageOutcome::Pending);

        board.start(&a).unwrap();
        board.succeed(&a, 1).unwrap();
        board.start(&b).unwrap();
        board.fail(&b, 1, "down").unwrap();

        assert_eq!(board.stage_outcome(&any_of), StageOutcome::Succeeded);
        assert_eq!(board.stage_outcome(&all_of), StageOutcome::Failed);
        assert_eq!(
            board.stage_outcome(&stage(BarrierPolicy::AllOf, &[])),
            StageOutcome::Skipped
        );
    }

    #[test]
    fn test_all_skipped_stage_is_skipped() {
        let a = NodeRef::action("A");
        let board = StatusBoard::new([a.clone()]);
        board.skip(&a, SkipReason::Cancelled).unwrap();
        assert_eq!(
            board.stage_outcome(&stage(BarrierPolicy::AllOf, &["A"])),
            StageOutcome::Skipped
        );
    }

    #[test]
    fn test_skip_after_upstream_failure_fails_stage() {
        let source = NodeRef::action("S3Source");
        let build = NodeRef::action("BuildFromS3");
        let halted = NodeRef::action("Lint");
        let board = StatusBoard::new([source.clone(), build.clone(), halted.clone()]);

        board.start(&source).unwrap();
        board.fail(&source, 1, "gone").unwrap();
        board
            .skip(&build, SkipReason::UpstreamFailed { node: source.clone() })
            .unwrap();
        board.skip(&halted, SkipReason::RunHalted).unwrap();

        assert_eq!(board.root_failure(&build), Some(source.clone()));
        assert_eq!(board.root_failure(&halted), None);
        assert_eq!(
            board.stage_outcome(&stage(BarrierPolicy::AllOf, &["BuildFromS3", "Lint"])),
            StageOutcome::Failed
        );
        assert_eq!(
            board.stage_failures(&stage(BarrierPolicy::AllOf, &["BuildFromS3", "Lint"])),
            vec![source]
        );
        assert_eq!(
            board.stage_outcome(&stage(BarrierPolicy::AllOf, &["Lint"])),
            StageOutcome::Skipped
        );
    }

    #[test]
    fn test_concurrent_start_applies_once() {
        let node = NodeRef::action("Build");
        let board = std::sync::Arc::new(StatusBoard::new([node.clone()]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let board = board.clone();
                let node = node.clone();
                std::thread::spawn(move || board.start(&node).is_ok())
            })
            .collect();
        let started = handles.into_iter().filter_map(|h| h.join().ok()).filter(|ok| *ok).count();

        assert_eq!(started, 1);
    }
}
