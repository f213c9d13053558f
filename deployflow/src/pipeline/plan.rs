//! Plan builder: layers the combined dependency graph into ordered batches.

use super::model::Pipeline;
use super::validation::ValidatedPipeline;
use crate::core::{Capability, NodeRef};
use crate::errors::PlanningInvariantError;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A set of nodes with no ordering constraint among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanBatch {
    /// Position in the plan.
    pub index: usize,
    /// Nodes in declaration order.
    pub nodes: Vec<NodeRef>,
}

/// Scheduling facts about one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNode {
    /// The node.
    pub node: NodeRef,
    /// Batch the node runs in.
    pub batch: usize,
    /// Capability that executes it.
    pub capability: Capability,
    /// Hard requirements that must have succeeded.
    pub requires: Vec<NodeRef>,
    /// Stage whose completion gates this action.
    pub gated_by: Option<String>,
}

/// Ordered batches computed from a validated pipeline.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pipeline: Arc<Pipeline>,
    batches: Vec<PlanBatch>,
    nodes: HashMap<NodeRef, PlannedNode>,
    edges: Vec<(NodeRef, NodeRef)>,
    fingerprint: String,
}

impl ExecutionPlan {
    /// The planned pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Shared handle to the planned pipeline.
    #[must_use]
    pub fn shared_pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Batches in execution order.
    #[must_use]
    pub fn batches(&self) -> &[PlanBatch] {
        &self.batches
    }

    /// Scheduling facts for a node.
    #[must_use]
    pub fn node(&self, node: &NodeRef) -> Option<&PlannedNode> {
        self.nodes.get(node)
    }

    /// Every ordering edge `(before, after)`, stage edges included.
    #[must_use]
    pub fn edges(&self) -> &[(NodeRef, NodeRef)] {
        &self.edges
    }

    /// Batch index of a node.
    #[must_use]
    pub fn batch_of(&self, node: &NodeRef) -> Option<usize> {
        self.nodes.get(node).map(|n| n.batch)
    }

    /// All nodes, batch by batch.
    pub fn topological_order(&self) -> impl Iterator<Item = &NodeRef> {
        self.batches.iter().flat_map(|b| b.nodes.iter())
    }

    /// Hex SHA-256 over the batch layout.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Number of planned nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds the execution plan of a validated pipeline.
///
/// Edges are the hard requirements of every node plus stage-order edges from
/// each action of a non-empty stage to each action of the next non-empty
/// stage. Batches are extracted by in-degree; ties keep declaration order.
///
/// # Errors
///
/// Returns [`PlanningInvariantError`] if extraction stalls, which validation
/// should have made impossible.
pub fn build_plan(validated: &ValidatedPipeline) -> Result<ExecutionPlan, PlanningInvariantError> {
    let pipeline = validated.shared();
    let order = pipeline.nodes_in_declaration_order();
    let index: HashMap<&NodeRef, usize> = order.iter().enumerate().map(|(i, n)| (n, i)).collect();

    let mut requires: Vec<Vec<NodeRef>> = Vec::with_capacity(order.len());
    let mut edge_set: HashSet<(usize, usize)> = HashSet::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut add_edge = |from: usize, to: usize| {
        if edge_set.insert((from, to)) {
            edges.push((from, to));
        }
    };

    for (to, node) in order.iter().enumerate() {
        let required = pipeline.requirements(node);
        for req in &required {
            if let Some(&from) = index.get(req) {
                add_edge(from, to);
            }
        }
        requires.push(required);
    }

    let non_empty: Vec<_> = pipeline.stages().iter().filter(|s| !s.actions.is_empty()).collect();
    for pair in non_empty.windows(2) {
        for before in &pair[0].actions {
            for after in &pair[1].actions {
                let (Some(&from), Some(&to)) = (
                    index.get(&NodeRef::action(before)),
                    index.get(&NodeRef::action(after)),
                ) else {
                    continue;
                };
                add_edge(from, to);
            }
        }
    }

    let levels = layer(&order, &edges)?;

    let mut nodes = HashMap::with_capacity(order.len());
    let mut batches = Vec::with_capacity(levels.len());
    for (batch, level) in levels.iter().enumerate() {
        for &i in level {
            let node = &order[i];
            let capability = pipeline.capability_of(node).unwrap_or(Capability::Provision);
            let gated_by = match node {
                NodeRef::Action(name) => pipeline.gating_stage(name).map(|s| s.name.clone()),
                NodeRef::Resource(_) => None,
            };
            nodes.insert(
                node.clone(),
                PlannedNode {
                    node: node.clone(),
                    batch,
                    capability,
                    requires: requires[i].clone(),
                    gated_by,
                },
            );
        }
        batches.push(PlanBatch {
            index: batch,
            nodes: level.iter().map(|&i| order[i].clone()).collect(),
        });
    }

    let fingerprint = fingerprint(pipeline.name(), &batches);
    tracing::info!(
        pipeline = %pipeline.name(),
        batches = batches.len(),
        nodes = nodes.len(),
        fingerprint = %fingerprint,
        "Built execution plan"
    );

    Ok(ExecutionPlan {
        edges: edges
            .iter()
            .map(|&(from, to)| (order[from].clone(), order[to].clone()))
            .collect(),
        pipeline,
        batches,
        nodes,
        fingerprint,
    })
}

/// Kahn extraction by levels over indexed nodes. Each level is sorted by
/// index, which is declaration order.
fn layer(nodes: &[NodeRef], edges: &[(usize, usize)]) -> Result<Vec<Vec<usize>>, PlanningInvariantError> {
    let mut in_degree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for &(from, to) in edges {
        successors[from].push(to);
        in_degree[to] += 1;
    }

    let mut levels = Vec::new();
    let mut placed = 0;
    let mut current: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            for &succ in &successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_unstable();
        placed += current.len();
        levels.push(current);
        current = next;
    }

    if placed < nodes.len() {
        let remaining = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].clone())
            .collect();
        return Err(PlanningInvariantError::new("topological extraction stalled", remaining));
    }
    Ok(levels)
}

fn fingerprint(pipeline: &str, batches: &[PlanBatch]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pipeline.as_bytes());
    for batch in batches {
        hasher.update(format!("\n{}:", batch.index).as_bytes());
        for node in &batch.nodes {
            hasher.update(node.to_string().as_bytes());
            hasher.update(b",");
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceKind;
    use crate::pipeline::{ActionSpec, PipelineBuilder, ResourceNode};
    use pretty_assertions::assert_eq;

    fn validated(builder: PipelineBuilder) -> ValidatedPipeline {
        ValidatedPipeline::new(builder.build()).unwrap()
    }

    fn three_stage() -> PipelineBuilder {
        let mut builder = PipelineBuilder::new("three");
        builder.add_stage("Source").unwrap();
        builder.add_stage("Build").unwrap();
        builder.add_stage("Deploy").unwrap();
        builder
            .add_action("Source", ActionSpec::source("Fetch").output("SourceOutput"))
            .unwrap();
        builder
            .add_action(
                "Build",
                ActionSpec::build("Compile").input("SourceOutput").output("buildOutput"),
            )
            .unwrap();
        builder
            .add_action("Deploy", ActionSpec::deploy("Release").input("buildOutput"))
            .unwrap();
        builder
    }

    #[test]
    fn test_three_stage_plan_has_three_batches() {
        let plan = build_plan(&validated(three_stage())).unwrap();
        let layout: Vec<Vec<String>> = plan
            .batches()
            .iter()
            .map(|b| b.nodes.iter().map(ToString::to_string).collect())
            .collect();
        assert_eq!(
            layout,
            vec![
                vec!["action:Fetch".to_string()],
                vec!["action:Compile".to_string()],
                vec!["action:Release".to_string()],
            ]
        );
        assert_eq!(
            plan.node(&NodeRef::action("Release")).unwrap().gated_by.as_deref(),
            Some("Build")
        );
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let mut builder = PipelineBuilder::new("ties");
        builder.add_resource(ResourceNode::new("Zeta", ResourceKind::Generic)).unwrap();
        builder.add_resource(ResourceNode::new("Alpha", ResourceKind::Generic)).unwrap();
        builder.add_stage("Source").unwrap();
        builder.add_action("Source", ActionSpec::source("B").output("b")).unwrap();
        builder.add_action("Source", ActionSpec::source("A").output("a")).unwrap();
        let plan = build_plan(&validated(builder)).unwrap();

        assert_eq!(
            plan.batches()[0].nodes,
            vec![
                NodeRef::resource("Zeta"),
                NodeRef::resource("Alpha"),
                NodeRef::action("B"),
                NodeRef::action("A"),
            ]
        );
    }

    #[test]
    fn test_resources_ordered_before_dependents() {
        let mut builder = PipelineBuilder::new("res");
        builder.add_resource(ResourceNode::new("Bucket", ResourceKind::Bucket)).unwrap();
        builder.add_resource(ResourceNode::new("BundleWrite", ResourceKind::StorageWrite)).unwrap();
        builder.add_resource(ResourceNode::new("Version", ResourceKind::ApplicationVersion)).unwrap();
        builder.add_dependency("BundleWrite", "Bucket").unwrap();
        builder.add_stage("Build").unwrap();
        builder.add_stage("Deploy").unwrap();
        builder
            .add_action("Build", ActionSpec::build("Package").output_stored_in("Bundle", "BundleWrite"))
            .unwrap();
        builder
            .add_action("Deploy", ActionSpec::deploy("Release").input("Bundle").resource("Version"))
            .unwrap();
        let plan = build_plan(&validated(builder)).unwrap();

        assert_eq!(plan.batch_of(&NodeRef::resource("Bucket")), Some(0));
        assert_eq!(plan.batch_of(&NodeRef::resource("BundleWrite")), Some(1));
        assert_eq!(plan.batch_of(&NodeRef::resource("Version")), Some(2));
        assert_eq!(plan.batch_of(&NodeRef::action("Package")), Some(2));
        assert_eq!(plan.batch_of(&NodeRef::action("Release")), Some(3));
        for (before, after) in plan.edges() {
            assert!(plan.batch_of(before) < plan.batch_of(after), "{before} -> {after}");
        }
    }

    #[test]
    fn test_fingerprint_stable_across_rebuilds() {
        let first = validated(three_stage());
        let plan = build_plan(&first).unwrap();
        let rebuilt = validated(first.pipeline().to_builder());
        let again = build_plan(&rebuilt).unwrap();

        assert_eq!(plan.fingerprint(), again.fingerprint());
        assert_eq!(plan.fingerprint().len(), 64);
    }

    #[test]
    fn test_layer_stalls_on_cycle() {
        let nodes = vec![NodeRef::action("a"), NodeRef::action("b"), NodeRef::action("c")];
        let err = layer(&nodes, &[(0, 1), (1, 2), (2, 1)]).unwrap_err();
        assert_eq!(err.remaining, vec![NodeRef::action("b"), NodeRef::action("c")]);
    }

    #[test]
    fn test_layer_levels() {
        let nodes = vec![NodeRef::action("a"), NodeRef::action("b"), NodeRef::action("c")];
        assert_eq!(layer(&nodes, &[(2, 0), (2, 1)]).unwrap(), vec![vec![2], vec![0, 1]]);
    }
}
