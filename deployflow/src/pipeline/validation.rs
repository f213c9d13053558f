//! Graph validation.
//!
//! Validation is pure: it reads a [`Pipeline`] and returns every problem it
//! finds in a single [`ValidationReport`]. Checks run in a fixed order:
//!
//! 1. construction errors recorded by the builder, then structural checks
//!    (unknown resource references, missing inputs, empty pipeline)
//! 2. every input resolves to a declared artifact
//! 3. no input is produced in the consumer's own or a later stage
//! 4. the resource graph, explicit and implicit edges together, is acyclic
//! 5. every artifact has exactly one producer

use super::model::Pipeline;
use super::resources::ResourceGraph;
use crate::core::{Capability, NodeRef};
use crate::errors::SpecificationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A problem that does not prevent planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// An artifact is produced but never consumed.
    UnconsumedArtifact {
        /// The artifact name.
        artifact: String,
        /// Its producer.
        producer: String,
    },
    /// A stage has no actions and never gates anything.
    EmptyStage {
        /// The stage name.
        stage: String,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnconsumedArtifact { artifact, producer } => {
                write!(f, "artifact '{artifact}' produced by '{producer}' is never consumed")
            }
            Self::EmptyStage { stage } => write!(f, "stage '{stage}' has no actions"),
        }
    }
}

/// Every error and warning found in a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Errors, in check order.
    pub errors: Vec<SpecificationError>,
    /// Warnings.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// Returns true if there are no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Stable codes of all errors, in order.
    #[must_use]
    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(SpecificationError::code).collect()
    }

    /// Returns the cycles reported, as node lists.
    #[must_use]
    pub fn cycles(&self) -> Vec<&[NodeRef]> {
        self.errors
            .iter()
            .filter_map(|err| match err {
                SpecificationError::CyclicDependency { cycle } => Some(cycle.as_slice()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "pipeline is valid ({} warnings)", self.warnings.len());
        }
        write!(f, "pipeline has {} specification error(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  [{}] {err}", err.code())?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// Validates a pipeline without modifying it.
#[must_use]
pub fn validate(pipeline: &Pipeline) -> ValidationReport {
    let mut report = ValidationReport {
        errors: pipeline.construction_errors().to_vec(),
        warnings: Vec::new(),
    };

    check_structure(pipeline, &mut report.errors);
    check_references(pipeline, &mut report.errors);
    report.errors.extend(
        find_resource_cycles(pipeline.resources())
            .into_iter()
            .map(|cycle| SpecificationError::CyclicDependency { cycle }),
    );
    check_producers(pipeline, &mut report.errors);
    collect_warnings(pipeline, &mut report.warnings);

    if report.is_valid() {
        tracing::debug!(pipeline = %pipeline.name(), warnings = report.warnings.len(), "Pipeline is valid");
    } else {
        tracing::debug!(pipeline = %pipeline.name(), errors = report.errors.len(), "Pipeline is invalid");
    }
    report
}

fn check_structure(pipeline: &Pipeline, errors: &mut Vec<SpecificationError>) {
    if pipeline.stages().is_empty() {
        errors.push(SpecificationError::EmptyPipeline {
            pipeline: pipeline.name().to_string(),
        });
    }

    let resources = pipeline.resources();
    let mut unknown = |node: &str, referenced_by: &str| {
        if !resources.contains(node) {
            errors.push(SpecificationError::UnknownNode {
                node: node.to_string(),
                referenced_by: referenced_by.to_string(),
            });
        }
    };

    for artifact in pipeline.artifacts().iter() {
        if let Some(storage) = &artifact.storage {
            unknown(storage, &artifact.name);
        }
    }
    for action in pipeline.actions() {
        let referenced = action
            .resource
            .iter()
            .chain(&action.resource_dependencies)
            .chain(action.outputs.iter().filter_map(|o| o.storage.as_ref()));
        for id in referenced {
            unknown(id, &action.name);
        }
    }

    for action in pipeline.actions() {
        let capability = action.capability();
        if matches!(capability, Capability::StoreWrite | Capability::Deploy) && action.inputs.is_empty() {
            errors.push(SpecificationError::MissingInput {
                action: action.name.clone(),
                capability,
            });
        }
    }
}

fn check_references(pipeline: &Pipeline, errors: &mut Vec<SpecificationError>) {
    let registry = pipeline.artifacts();

    for reference in registry.references() {
        if let Err(unknown) = registry.resolve(&reference.consumer, &reference.artifact) {
            errors.push(unknown);
        }
    }

    for reference in registry.references() {
        let Some(producer) = registry.producer_of(&reference.artifact) else {
            continue;
        };
        let (Some(consumer), Some(producing)) =
            (pipeline.action(&reference.consumer), pipeline.action(producer))
        else {
            continue;
        };
        if consumer.stage_index <= producing.stage_index {
            errors.push(SpecificationError::ForwardReference {
                artifact: reference.artifact.clone(),
                consumer: consumer.name.clone(),
                consumer_stage: consumer.stage.clone(),
                producer: producing.name.clone(),
                producer_stage: producing.stage.clone(),
            });
        }
    }
}

fn check_producers(pipeline: &Pipeline, errors: &mut Vec<SpecificationError>) {
    for artifact in pipeline.artifacts().iter() {
        match &artifact.producer {
            Some(first) => {
                for second in artifact.conflicting_producers() {
                    errors.push(SpecificationError::DuplicateArtifact {
                        artifact: artifact.name.clone(),
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
            }
            None => errors.push(SpecificationError::UnproducedArtifact {
                artifact: artifact.name.clone(),
            }),
        }
    }
}

fn collect_warnings(pipeline: &Pipeline, warnings: &mut Vec<ValidationWarning>) {
    let registry = pipeline.artifacts();
    for artifact in registry.iter() {
        if let Some(producer) = &artifact.producer {
            if registry.consumers_of(&artifact.name).is_empty() {
                warnings.push(ValidationWarning::UnconsumedArtifact {
                    artifact: artifact.name.clone(),
                    producer: producer.clone(),
                });
            }
        }
    }
    for stage in pipeline.stages().iter().filter(|s| s.actions.is_empty()) {
        warnings.push(ValidationWarning::EmptyStage {
            stage: stage.name.clone(),
        });
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

struct CycleFinder<'a> {
    graph: &'a ResourceGraph,
    ids: Vec<&'a str>,
    position: HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    stack: Vec<usize>,
    found: Vec<Vec<usize>>,
    seen: HashSet<Vec<usize>>,
}

impl<'a> CycleFinder<'a> {
    fn visit(&mut self, node: usize) {
        self.marks[node] = Mark::Active;
        self.stack.push(node);

        let graph = self.graph;
        for dep in graph.dependencies_of(self.ids[node]) {
            let Some(&next) = self.position.get(dep) else {
                continue;
            };
            match self.marks[next] {
                Mark::New => self.visit(next),
                Mark::Active => self.record(next),
                Mark::Done => {}
            }
        }

        self.stack.pop();
        self.marks[node] = Mark::Done;
    }

    /// The stack from `entry` upward is a chain of "depends on" edges closed
    /// by the edge just found. Reversed, it lists members in creation order.
    fn record(&mut self, entry: usize) {
        let Some(start) = self.stack.iter().rposition(|&n| n == entry) else {
            return;
        };
        let mut cycle: Vec<usize> = self.stack[start..].iter().rev().copied().collect();
        if let Some(first) = cycle.iter().enumerate().min_by_key(|&(_, n)| *n).map(|(i, _)| i) {
            cycle.rotate_left(first);
        }

        let mut members = cycle.clone();
        members.sort_unstable();
        if self.seen.insert(members) {
            self.found.push(cycle);
        }
    }
}

/// Finds dependency cycles among resource nodes.
///
/// Each cycle lists its members so that every node must exist before the
/// next, the last before the first, starting at the earliest-declared member.
/// Cycles are reported once per member set, in discovery order.
#[must_use]
pub fn find_resource_cycles(graph: &ResourceGraph) -> Vec<Vec<NodeRef>> {
    let ids: Vec<&str> = graph.iter().map(|n| n.id.as_str()).collect();
    let position = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut finder = CycleFinder {
        graph,
        marks: vec![Mark::New; ids.len()],
        ids,
        position,
        stack: Vec::new(),
        found: Vec::new(),
        seen: HashSet::new(),
    };

    for start in 0..finder.ids.len() {
        if finder.marks[start] == Mark::New {
            finder.visit(start);
        }
    }

    finder
        .found
        .iter()
        .map(|cycle| cycle.iter().map(|&i| NodeRef::resource(finder.ids[i])).collect())
        .collect()
}

/// A pipeline that passed validation; the only input the planner accepts.
#[derive(Debug, Clone)]
pub struct ValidatedPipeline {
    pipeline: Arc<Pipeline>,
    warnings: Vec<ValidationWarning>,
}

impl ValidatedPipeline {
    /// Validates `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns the full report if any error was found.
    pub fn new(pipeline: Pipeline) -> Result<Self, ValidationReport> {
        let report = validate(&pipeline);
        if !report.is_valid() {
            return Err(report);
        }
        for warning in &report.warnings {
            tracing::warn!(pipeline = %pipeline.name(), "{warning}");
        }
        Ok(Self {
            pipeline: Arc::new(pipeline),
            warnings: report.warnings,
        })
    }

    /// The validated pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Shared handle to the pipeline.
    #[must_use]
    pub fn shared(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Warnings found during validation.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }
}
