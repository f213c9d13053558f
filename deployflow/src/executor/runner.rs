//! Batch-by-batch execution of a plan against a provider set.

use super::board::StatusBoard;
use super::result::{overall_status, BatchReport, NodeReport, RunResult, StageReport};
use super::store::ArtifactStore;
use crate::cancellation::CancellationToken;
use crate::config::ExecutorConfig;
use crate::core::{
    ArtifactHandle, BarrierPolicy, Capability, NodeRef, NodeStatus, SkipReason, StageOutcome,
};
use crate::errors::{ExecutorError, ProviderError};
use crate::events::{EventSink, NoOpEventSink, RunEvent};
use crate::pipeline::{
    build_plan, with_retry, Action, ExecutionPlan, FailureCollector, FailureMode, FailureRecord,
    Pipeline, ProviderBinding, RetryConfig, ValidatedPipeline,
};
use crate::providers::ProviderSet;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Runs execution plans.
///
/// Batches run strictly in order. Nodes of a batch run concurrently, bounded
/// by [`ExecutorConfig::max_concurrency`]. The executor only suspends on
/// provider calls and backoff sleeps.
#[derive(Clone)]
pub struct PipelineExecutor {
    providers: ProviderSet,
    config: ExecutorConfig,
    sink: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
}

impl PipelineExecutor {
    /// Creates an executor with the default configuration.
    #[must_use]
    pub fn new(providers: ProviderSet) -> Self {
        Self {
            providers,
            config: ExecutorConfig::default(),
            sink: Arc::new(NoOpEventSink),
            cancellation: CancellationToken::shared(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the cancellation token observed by runs.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// The cancellation token observed by runs.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Plans and executes a validated pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::PlanningInvariant`] if planning stalls, or any
    /// error of [`PipelineExecutor::execute`].
    pub async fn execute_pipeline(
        &self,
        pipeline: &ValidatedPipeline,
    ) -> Result<RunResult, ExecutorError> {
        let plan = build_plan(pipeline)?;
        self.execute(&plan).await
    }

    /// Executes a plan.
    ///
    /// Node failures never surface as errors; they are reported in the
    /// returned [`RunResult`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] before any node runs if the plan names a node
    /// its pipeline does not contain, or uses a capability with no provider.
    pub async fn execute(&self, plan: &ExecutionPlan) -> Result<RunResult, ExecutorError> {
        self.precheck(plan)?;

        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "run",
            pipeline = %plan.pipeline().name(),
            run_id = %run_id
        );
        Ok(self.run(plan, run_id).instrument(span).await)
    }

    fn precheck(&self, plan: &ExecutionPlan) -> Result<(), ExecutorError> {
        let pipeline = plan.pipeline();
        for node in plan.topological_order() {
            let capability = pipeline
                .capability_of(node)
                .ok_or_else(|| ExecutorError::UnknownPlanNode(node.clone()))?;
            if !self.providers.supports(capability) {
                return Err(ExecutorError::MissingProvider {
                    capability,
                    node: node.clone(),
                });
            }
        }
        Ok(())
    }

    async fn run(&self, plan: &ExecutionPlan, run_id: String) -> RunResult {
        let started_at = Utc::now();
        let state = Arc::new(RunState {
            run_id,
            pipeline: plan.shared_pipeline(),
            providers: self.providers.clone(),
            config: self.config.clone(),
            sink: Arc::clone(&self.sink),
            token: Arc::clone(&self.cancellation),
            board: StatusBoard::new(plan.topological_order().cloned()),
            store: ArtifactStore::new(),
            halted: AtomicBool::new(false),
            permits: Semaphore::new(self.config.max_concurrency.max(1)),
        });
        let mut collector = FailureCollector::new(self.config.failure_mode);
        let mut stages: HashMap<String, StageOutcome> = state
            .pipeline
            .stages()
            .iter()
            .map(|stage| (stage.name.clone(), StageOutcome::Pending))
            .collect();

        info!(
            batches = plan.batches().len(),
            nodes = plan.len(),
            fingerprint = %plan.fingerprint(),
            "Run started"
        );
        state
            .emit(RunEvent::RunStarted {
                pipeline: state.pipeline.name().to_string(),
                run_id: state.run_id.clone(),
                batches: plan.batches().len(),
                fingerprint: plan.fingerprint().to_string(),
            })
            .await;

        for batch in plan.batches() {
            debug!(batch = batch.index, nodes = batch.nodes.len(), "Releasing batch");
            state
                .emit(RunEvent::BatchStarted {
                    run_id: state.run_id.clone(),
                    index: batch.index,
                    nodes: batch.nodes.clone(),
                })
                .await;

            let mut workers = Vec::new();
            for node in &batch.nodes {
                if let Some(reason) = skip_before_start(&state, plan, node, &stages) {
                    state.skip(node, reason).await;
                    continue;
                }
                let span = tracing::debug_span!("node", node = %node);
                let worker = tokio::spawn(run_node(Arc::clone(&state), node.clone()).instrument(span));
                workers.push((node.clone(), worker));
            }

            let (nodes, handles): (Vec<_>, Vec<_>) = workers.into_iter().unzip();
            let joined = futures::future::join_all(handles).await;
            for (node, result) in nodes.iter().zip(joined) {
                if let Err(error) = result {
                    state.worker_lost(node, &error).await;
                }
            }

            for node in &batch.nodes {
                if state.board.status(node) == Some(NodeStatus::Failed) && state.fails_run_immediately(node) {
                    collector.record_fatal(state.failure_record(node));
                }
            }
            resolve_stages(&state, &mut stages, &mut collector).await;
            if collector.should_halt() {
                state.halted.store(true, Ordering::SeqCst);
            }
        }

        let finished_at = Utc::now();
        let cancelled = state.token.is_cancelled();
        let any_failure = plan
            .topological_order()
            .any(|node| state.board.status(node) == Some(NodeStatus::Failed));
        let status = overall_status(collector.has_fatal(), cancelled, any_failure);

        let duration_ms = (finished_at - started_at).num_milliseconds();
        info!(status = %status, duration_ms, "Run completed");
        state
            .emit(RunEvent::RunCompleted {
                run_id: state.run_id.clone(),
                status,
                duration_ms,
            })
            .await;

        RunResult {
            pipeline_id: state.pipeline.name().to_string(),
            run_id: state.run_id.clone(),
            plan_fingerprint: plan.fingerprint().to_string(),
            started_at,
            finished_at,
            batches: plan
                .batches()
                .iter()
                .map(|batch| BatchReport {
                    index: batch.index,
                    nodes: batch.nodes.iter().map(|node| state.report(node)).collect(),
                })
                .collect(),
            stages: state
                .pipeline
                .stages()
                .iter()
                .map(|stage| StageReport {
                    name: stage.name.clone(),
                    barrier: stage.barrier,
                    outcome: stages
                        .get(&stage.name)
                        .copied()
                        .filter(|outcome| *outcome != StageOutcome::Pending)
                        .unwrap_or_else(|| state.board.stage_outcome(stage)),
                })
                .collect(),
            overall_status: status,
            first_failure: collector.first_fatal().cloned(),
            absorbed_failures: collector.absorbed().to_vec(),
            cancelled,
            artifacts: state.store.snapshot(),
            resources: state.store.resource_snapshot(),
        }
    }
}

impl fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

/// Executes a plan with the default configuration.
///
/// # Errors
///
/// See [`PipelineExecutor::execute`].
pub async fn execute(plan: &ExecutionPlan, providers: ProviderSet) -> Result<RunResult, ExecutorError> {
    PipelineExecutor::new(providers).execute(plan).await
}

/// State shared by the workers of one run.
struct RunState {
    run_id: String,
    pipeline: Arc<Pipeline>,
    providers: ProviderSet,
    config: ExecutorConfig,
    sink: Arc<dyn EventSink>,
    token: Arc<CancellationToken>,
    board: StatusBoard,
    store: ArtifactStore,
    halted: AtomicBool,
    permits: Semaphore,
}

impl RunState {
    async fn emit(&self, event: RunEvent) {
        self.sink.emit_run_event(&event).await;
    }

    fn interrupted(&self) -> Option<SkipReason> {
        if self.token.is_cancelled() {
            Some(SkipReason::Cancelled)
        } else if self.halted.load(Ordering::SeqCst) {
            Some(SkipReason::RunHalted)
        } else {
            None
        }
    }

    async fn skip(&self, node: &NodeRef, reason: SkipReason) {
        match self.board.skip(node, reason.clone()) {
            Ok(()) => {
                debug!(node = %node, reason = %reason, "Node skipped");
                self.emit(RunEvent::NodeSkipped {
                    run_id: self.run_id.clone(),
                    node: node.clone(),
                    skip_reason: reason,
                })
                .await;
            }
            Err(error) => warn!(error = %error, "Skip rejected"),
        }
    }

    /// Resource failures and failures in all-of stages fail the run at once.
    /// Failures in any-of stages wait for the stage to resolve.
    fn fails_run_immediately(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Resource(_) => true,
            NodeRef::Action(name) => self
                .pipeline
                .action(name)
                .and_then(|action| self.pipeline.stage(&action.stage))
                .map_or(true, |stage| stage.barrier == BarrierPolicy::AllOf),
        }
    }

    fn retry_config(&self, node: &NodeRef) -> RetryConfig {
        let declared = match node {
            NodeRef::Action(name) => self.pipeline.action(name).and_then(|a| a.retry.clone()),
            NodeRef::Resource(id) => self.pipeline.resources().get(id).and_then(|r| r.retry.clone()),
        };
        declared.unwrap_or_else(|| self.config.default_retry.clone())
    }

    fn failure_record(&self, node: &NodeRef) -> FailureRecord {
        let record = self.board.record(node).unwrap_or_default();
        FailureRecord::new(node.clone(), record.error.unwrap_or_default(), record.attempts)
    }

    fn report(&self, node: &NodeRef) -> NodeReport {
        let record = self.board.record(node).unwrap_or_default();
        NodeReport {
            node_id: node.clone(),
            status: record.status,
            attempt: record.attempts,
            error: record.error,
            skip_reason: record.skip_reason,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }

    async fn record_failure(&self, node: &NodeRef, attempts: u32, error: String) {
        if let Err(rejected) = self.board.fail(node, attempts, &error) {
            warn!(error = %rejected, "Failure transition rejected");
            return;
        }
        warn!(node = %node, attempts, error = %error, "Node failed");
        if self.config.failure_mode == FailureMode::FailFast && self.fails_run_immediately(node) {
            self.halted.store(true, Ordering::SeqCst);
        }
        self.emit(RunEvent::NodeFailed {
            run_id: self.run_id.clone(),
            node: node.clone(),
            attempts,
            error,
        })
        .await;
    }

    /// A worker that panicked or was aborted counts as a failed node.
    async fn worker_lost(&self, node: &NodeRef, error: &JoinError) {
        let message = if error.is_panic() {
            "provider call panicked".to_string()
        } else {
            "worker task was cancelled".to_string()
        };
        if self.board.status(node) == Some(NodeStatus::Pending) {
            let _ = self.board.start(node);
        }
        let attempts = self.board.record(node).map_or(1, |r| r.attempts.max(1));
        self.record_failure(node, attempts, message).await;
    }

    async fn invoke(&self, node: &NodeRef) -> Result<(), ProviderError> {
        let timeout_ms = match node {
            NodeRef::Action(name) => self.pipeline.action(name).and_then(|a| a.timeout_ms),
            NodeRef::Resource(_) => None,
        }
        .or(self.config.node_timeout_ms);

        match timeout_ms {
            Some(ms) => {
                let capability = self
                    .pipeline
                    .capability_of(node)
                    .unwrap_or(Capability::Provision);
                tokio::time::timeout(Duration::from_millis(ms), self.call_provider(node))
                    .await
                    .unwrap_or(Err(ProviderError::Timeout {
                        capability,
                        timeout_ms: ms,
                    }))
            }
            None => self.call_provider(node).await,
        }
    }

    async fn call_provider(&self, node: &NodeRef) -> Result<(), ProviderError> {
        match node {
            NodeRef::Resource(id) => {
                let resource = self.pipeline.resources().get(id).ok_or_else(|| {
                    ProviderError::permanent(Capability::Provision, format!("unknown resource '{id}'"))
                })?;
                let provisioner = self
                    .providers
                    .provisioner()
                    .ok_or_else(|| missing(Capability::Provision))?;
                let provisioned = provisioner.provision(resource).await?;
                self.store.put_resource(id.clone(), provisioned);
                Ok(())
            }
            NodeRef::Action(name) => {
                let action = self.pipeline.action(name).ok_or_else(|| {
                    ProviderError::Other(anyhow::anyhow!("unknown action '{name}'"))
                })?;
                let handle = self.call_action(action).await?;
                for output in action.output_names() {
                    self.store.put(output, handle.clone());
                }
                Ok(())
            }
        }
    }

    async fn call_action(&self, action: &Action) -> Result<ArtifactHandle, ProviderError> {
        let capability = action.capability();
        match &action.binding {
            ProviderBinding::SourceFetch { repository } => {
                let source = self.providers.source().ok_or_else(|| missing(capability))?;
                source.fetch_source(repository).await
            }
            ProviderBinding::Build { project } => {
                let build = self.providers.build().ok_or_else(|| missing(capability))?;
                let inputs = self.store.gather(&action.inputs);
                build.run_build(project, &inputs).await
            }
            ProviderBinding::StoreWrite { destination_key } => {
                let storage = self.providers.storage().ok_or_else(|| missing(capability))?;
                let input = self.first_input(action)?;
                storage
                    .write_storage(&input, destination_key)
                    .await
                    .map(ArtifactHandle::from)
            }
            ProviderBinding::Deploy {
                target,
                version_label,
            } => {
                let deploy = self.providers.deploy().ok_or_else(|| missing(capability))?;
                let input = self.first_input(action)?;
                let label = version_label
                    .clone()
                    .unwrap_or_else(|| self.version_label(&action.name));
                let receipt = deploy.deploy(target, &input, &label).await?;
                Ok(
                    ArtifactHandle::new(format!("deployment://{}", receipt.deployment_id))
                        .with_metadata("version_label", receipt.version_label),
                )
            }
        }
    }

    fn first_input(&self, action: &Action) -> Result<ArtifactHandle, ProviderError> {
        self.store
            .gather(&action.inputs)
            .into_iter()
            .next()
            .ok_or_else(|| {
                ProviderError::permanent(
                    action.capability(),
                    format!("no input artifact available for action '{}'", action.name),
                )
            })
    }

    /// `{prefix}{action}-{first run id segment}`.
    fn version_label(&self, action: &str) -> String {
        let short = self.run_id.split('-').next().unwrap_or(&self.run_id);
        format!("{}{action}-{short}", self.config.version_label_prefix)
    }
}

fn missing(capability: Capability) -> ProviderError {
    ProviderError::permanent(capability, "no provider registered")
}

/// Reason a node must not start, checked in precedence order: cancellation,
/// halt, a requirement that did not succeed, an incomplete gating stage.
fn skip_before_start(
    state: &RunState,
    plan: &ExecutionPlan,
    node: &NodeRef,
    stages: &HashMap<String, StageOutcome>,
) -> Option<SkipReason> {
    if let Some(reason) = state.interrupted() {
        return Some(reason);
    }
    let planned = plan.node(node)?;
    if let Some(blocker) = planned
        .requires
        .iter()
        .find(|required| state.board.status(required) != Some(NodeStatus::Succeeded))
    {
        return Some(SkipReason::UpstreamFailed {
            node: blocker.clone(),
        });
    }
    match &planned.gated_by {
        Some(stage) if stages.get(stage) != Some(&StageOutcome::Succeeded) => {
            Some(SkipReason::StageIncomplete {
                stage: stage.clone(),
            })
        }
        _ => None,
    }
}

async fn run_node(state: Arc<RunState>, node: NodeRef) {
    let permit = tokio::select! {
        permit = state.permits.acquire() => permit.ok(),
        () = state.token.cancelled() => None,
    };
    let Some(_permit) = permit else {
        state.skip(&node, SkipReason::Cancelled).await;
        return;
    };
    if let Some(reason) = state.interrupted() {
        state.skip(&node, reason).await;
        return;
    }
    if let Err(error) = state.board.start(&node) {
        warn!(error = %error, "Start rejected");
        return;
    }

    debug!(node = %node, "Node started");
    state
        .emit(RunEvent::NodeStarted {
            run_id: state.run_id.clone(),
            node: node.clone(),
            attempt: 1,
        })
        .await;

    let retry = state.retry_config(&node);
    let (result, attempts) = with_retry(
        &retry,
        |attempt| {
            let state = Arc::clone(&state);
            let node = node.clone();
            async move {
                state.board.note_attempt(&node, attempt);
                state.invoke(&node).await
            }
        },
        |attempt, delay, error| {
            let event = RunEvent::NodeRetrying {
                run_id: state.run_id.clone(),
                node: node.clone(),
                attempt,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error: error.to_string(),
            };
            state.sink.try_emit(event.name(), Some(event.data()));
        },
    )
    .await;

    match result {
        Ok(()) => {
            if let Err(error) = state.board.succeed(&node, attempts) {
                warn!(error = %error, "Success transition rejected");
                return;
            }
            info!(node = %node, attempts, "Node succeeded");
            state
                .emit(RunEvent::NodeSucceeded {
                    run_id: state.run_id.clone(),
                    node,
                    attempts,
                })
                .await;
        }
        Err(error) => state.record_failure(&node, attempts, error.to_string()).await,
    }
}

/// Resolves every stage whose actions are all terminal.
///
/// A stage that fails turns the failures behind it fatal, in declaration
/// order, including failures an earlier any-of stage absorbed. An any-of
/// stage that succeeds absorbs the failures of its actions.
async fn resolve_stages(
    state: &RunState,
    stages: &mut HashMap<String, StageOutcome>,
    collector: &mut FailureCollector,
) {
    for stage in state.pipeline.stages() {
        if stages.get(&stage.name) != Some(&StageOutcome::Pending) {
            continue;
        }
        let outcome = state.board.stage_outcome(stage);
        if outcome == StageOutcome::Pending {
            continue;
        }
        stages.insert(stage.name.clone(), outcome);

        let failed: Vec<NodeRef> = stage
            .actions
            .iter()
            .map(NodeRef::action)
            .filter(|node| state.board.status(node) == Some(NodeStatus::Failed))
            .collect();

        match outcome {
            StageOutcome::Succeeded => {
                for node in &failed {
                    collector.record_absorbed(state.failure_record(node));
                }
                info!(stage = %stage.name, "Stage completed");
                state
                    .emit(RunEvent::StageCompleted {
                        run_id: state.run_id.clone(),
                        stage: stage.name.clone(),
                    })
                    .await;
            }
            StageOutcome::Failed => {
                let failed = state.board.stage_failures(stage);
                for node in &failed {
                    collector.record_fatal(state.failure_record(node));
                }
                warn!(stage = %stage.name, failed = failed.len(), "Stage failed");
                state
                    .emit(RunEvent::StageFailed {
                        run_id: state.run_id.clone(),
                        stage: stage.name.clone(),
                    })
                    .await;
            }
            StageOutcome::Skipped | StageOutcome::Pending => {
                debug!(stage = %stage.name, outcome = ?outcome, "Stage resolved");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeployReceipt, OverallStatus};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{ActionSpec, PipelineBuilder};
    use crate::providers::{MockBuildProvider, MockDeployProvider, MockSourceProvider};
    use crate::testing::ScriptedProvider;
    use pretty_assertions::assert_eq;

    fn three_stage() -> ValidatedPipeline {
        let mut builder = PipelineBuilder::new("app");
        builder.add_stage("Source").unwrap();
        builder.add_stage("Build").unwrap();
        builder.add_stage("Deploy").unwrap();
        builder
            .add_action("Source", ActionSpec::source("Checkout").output("SourceOutput"))
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
        ValidatedPipeline::new(builder.build()).unwrap()
    }

    fn plan() -> ExecutionPlan {
        build_plan(&three_stage()).unwrap()
    }

    #[tokio::test]
    async fn test_all_succeed_with_mocks() {
        let mut source = MockSourceProvider::new();
        source
            .expect_fetch_source()
            .times(1)
            .returning(|repo| Ok(ArtifactHandle::new(format!("git://{repo}"))));
        let mut build = MockBuildProvider::new();
        build
            .expect_run_build()
            .withf(|project, inputs| project == "Compile" && inputs.len() == 1 && inputs[0].uri == "git://Checkout")
            .times(1)
            .returning(|_, _| Ok(ArtifactHandle::new("s3://bundle.zip")));
        let mut deploy = MockDeployProvider::new();
        deploy
            .expect_deploy()
            .withf(|target, artifact, label| {
                target == "Release" && artifact.uri == "s3://bundle.zip" && label.starts_with("v-Release-")
            })
            .times(1)
            .returning(|_, _, label| Ok(DeployReceipt::new("d-1", label)));

        let providers = ProviderSet::new()
            .with_source(Arc::new(source))
            .with_build(Arc::new(build))
            .with_deploy(Arc::new(deploy));
        let result = execute(&plan(), providers).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::Succeeded);
        assert!(result.nodes().all(|n| n.status == NodeStatus::Succeeded));
        assert_eq!(result.batches.len(), 3);
        assert_eq!(result.artifacts["buildOutput"].uri, "s3://bundle.zip");
        assert!(result.first_failure.is_none());
    }

    #[tokio::test]
    async fn test_missing_provider_rejected_before_run() {
        let scripted = ScriptedProvider::shared();
        let providers = ProviderSet::new().with_source(scripted.clone()).with_build(scripted.clone());

        let err = execute(&plan(), providers).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::MissingProvider { capability: Capability::Deploy, ref node } if *node == NodeRef::action("Release")
        ));
        assert_eq!(scripted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_build_failure_skips_deploy() {
        let scripted = ScriptedProvider::shared();
        scripted.fail_always("Compile");
        let executor = PipelineExecutor::new(ProviderSet::uniform(scripted.clone())).with_config(
            ExecutorConfig::new().with_default_retry(RetryConfig::new().with_max_retries(2).with_base_delay_ms(1)),
        );

        let result = executor.execute(&plan()).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::Failed);
        let build = result.node(&NodeRef::action("Compile")).unwrap();
        assert_eq!(build.status, NodeStatus::Failed);
        assert_eq!(build.attempt, 3);
        assert_eq!(scripted.calls_for("Compile"), 3);
        assert_eq!(result.status_of(&NodeRef::action("Release")), Some(NodeStatus::Skipped));
        assert_eq!(result.first_failure.as_ref().map(|f| f.node.clone()), Some(NodeRef::action("Compile")));
        assert_eq!(scripted.calls_for("Release"), 0);
    }

    #[tokio::test]
    async fn test_retry_recovers_and_emits_retrying() {
        let scripted = ScriptedProvider::shared();
        scripted.fail_times("Compile", 1);
        let sink = Arc::new(CollectingEventSink::new());
        let executor = PipelineExecutor::new(ProviderSet::uniform(scripted.clone()))
            .with_event_sink(sink.clone())
            .with_config(ExecutorConfig::new().with_default_retry(
                RetryConfig::new().with_max_retries(1).with_base_delay_ms(1),
            ));

        let result = executor.execute(&plan()).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.node(&NodeRef::action("Compile")).unwrap().attempt, 2);
        assert_eq!(sink.events_of_type("node.retrying").len(), 1);
        let names = sink.names();
        assert_eq!(names.first().map(String::as_str), Some("run.started"));
        assert_eq!(names.last().map(String::as_str), Some("run.completed"));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let scripted = ScriptedProvider::shared();
        scripted.fail_permanently("Checkout");
        let executor = PipelineExecutor::new(ProviderSet::uniform(scripted.clone())).with_config(
            ExecutorConfig::new().with_default_retry(RetryConfig::new().with_max_retries(3).with_base_delay_ms(1)),
        );

        let result = executor.execute(&plan()).await.unwrap();
        assert_eq!(scripted.calls_for("Checkout"), 1);
        assert_eq!(result.overall_status, OverallStatus::Failed);
        assert_eq!(
            result.node(&NodeRef::action("Compile")).unwrap().skip_reason,
            Some(SkipReason::RunHalted)
        );
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let scripted = ScriptedProvider::shared();
        scripted.delay("Checkout", Duration::from_millis(200));
        let executor = PipelineExecutor::new(ProviderSet::uniform(scripted))
            .with_config(ExecutorConfig::new().with_node_timeout_ms(10));

        let result = executor.execute(&plan()).await.unwrap();
        let source = result.node(&NodeRef::action("Checkout")).unwrap();
        assert_eq!(source.status, NodeStatus::Failed);
        assert!(source.error.as_deref().unwrap_or_default().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panicking_provider_reported_as_failed() {
        let scripted = ScriptedProvider::shared();
        scripted.panic_on("Compile");

        let result = execute(&plan(), ProviderSet::uniform(scripted)).await.unwrap();
        let build = result.node(&NodeRef::action("Compile")).unwrap();
        assert_eq!(build.status, NodeStatus::Failed);
        assert_eq!(build.error.as_deref(), Some("provider call panicked"));
        assert_eq!(result.overall_status, OverallStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let scripted = ScriptedProvider::shared();
        let token = CancellationToken::shared();
        token.cancel("operator abort");
        let executor = PipelineExecutor::new(ProviderSet::uniform(scripted.clone())).with_cancellation(token);

        let result = executor.execute(&plan()).await.unwrap();

        assert_eq!(result.overall_status, OverallStatus::Cancelled);
        assert!(result.cancelled);
        assert!(result
            .nodes()
            .all(|n| n.skip_reason == Some(SkipReason::Cancelled)));
        assert_eq!(scripted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_version_label_used() {
        let mut builder = PipelineBuilder::new("app");
        builder.add_stage("Build").unwrap();
        builder.add_stage("Deploy").unwrap();
        builder
            .add_action("Build", ActionSpec::build("Compile").output("Bundle"))
            .unwrap();
        builder
            .add_action(
                "Deploy",
                ActionSpec::deploy("Release")
                    .input("Bundle")
                    .binding(ProviderBinding::deploy_version("prod-env", "release-7")),
            )
            .unwrap();
        let validated = ValidatedPipeline::new(builder.build()).unwrap();
        let scripted = ScriptedProvider::shared();

        let result = PipelineExecutor::new(ProviderSet::uniform(scripted.clone()))
            .execute_pipeline(&validated)
            .await
            .unwrap();

        assert!(result.is_success());
        let deploy = scripted
            .calls()
            .into_iter()
            .find(|c| c.capability == Capability::Deploy)
            .unwrap();
        assert_eq!(deploy.reference, "prod-env");
        assert_eq!(deploy.detail.as_deref(), Some("release-7"));
    }
}
