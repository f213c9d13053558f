//! Failure tolerance for plan execution.
//!
//! Decides which failures are fatal for the run, and whether a fatal failure
//! halts every node that has not started yet.

use crate::core::NodeRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How to handle fatal node failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Skip every not-yet-started node after the first fatal failure (default).
    #[default]
    FailFast,
    /// Skip only the dependents of failed nodes; independent branches continue.
    ContinueOnFailure,
}

/// Record of a node failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// The failed node.
    pub node: NodeRef,
    /// Error message of the last attempt.
    pub error: String,
    /// Attempts made.
    pub attempts: u32,
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(node: NodeRef, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            node,
            error: error.into(),
            attempts,
            recorded_at: Utc::now(),
        }
    }
}

/// Collects failures during a run and classifies them.
#[derive(Debug)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    fatal: Vec<FailureRecord>,
    absorbed: Vec<FailureRecord>,
    seen: HashSet<NodeRef>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            fatal: Vec::new(),
            absorbed: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Records a failure that fails the run.
    ///
    /// A failure absorbed earlier becomes fatal when a later stage cannot
    /// complete because of it.
    pub fn record_fatal(&mut self, record: FailureRecord) {
        if self.seen.insert(record.node.clone()) {
            self.fatal.push(record);
        } else if let Some(pos) = self.absorbed.iter().position(|r| r.node == record.node) {
            let absorbed = self.absorbed.remove(pos);
            self.fatal.push(absorbed);
        }
    }

    /// Records a failure tolerated by an any-of stage.
    pub fn record_absorbed(&mut self, record: FailureRecord) {
        if self.seen.insert(record.node.clone()) {
            self.absorbed.push(record);
        }
    }

    /// Returns true if a fatal failure has been recorded.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        !self.fatal.is_empty()
    }

    /// Returns true if nodes that have not started must be skipped.
    #[must_use]
    pub fn should_halt(&self) -> bool {
        match self.mode {
            FailureMode::FailFast => self.has_fatal(),
            FailureMode::ContinueOnFailure => false,
        }
    }

    /// The first fatal failure, if any.
    #[must_use]
    pub fn first_fatal(&self) -> Option<&FailureRecord> {
        self.fatal.first()
    }

    /// All fatal failures in detection order.
    #[must_use]
    pub fn fatal(&self) -> &[FailureRecord] {
        &self.fatal
    }

    /// All absorbed failures.
    #[must_use]
    pub fn absorbed(&self) -> &[FailureRecord] {
        &self.absorbed
    }
}

impl Default for FailureCollector {
    fn default() -> Self {
        Self::new(FailureMode::default())
    }
}
