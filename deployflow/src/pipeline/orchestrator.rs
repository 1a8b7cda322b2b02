//! The pipeline orchestrator.
//!
//! Runs stages strictly in order. Inside a stage, actions are grouped by run
//! order; each group runs concurrently to completion before the next one is
//! considered, and any failure halts the execution. Promotion milestones are
//! checked before a group starts and applied as actions succeed.

use super::{
    standard_pipeline, ActionSpec, Collaborators, ExecutionStore, FailureInfo,
    InMemoryExecutionStore, Pipeline, PipelineExecution, SourceEvent, StageSpec,
};
use crate::approval::{ApprovalRecord, ApprovalService, DecisionRequest};
use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
use crate::cancellation::{CancellationRegistry, CancellationToken};
use crate::config::{PipelineConfig, SourceConfig};
use crate::context::{ActionContext, ActionInputs, ExecutionIdentity, PriorOutput};
use crate::core::{keys, ActionKind, ActionOutput, ExecutionStatus, FailureKind, PipelineEvent, StageStatus};
use crate::errors::{ArtifactError, DeployflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::{ExecutionSpanAttributes, SpanTimer};
use crate::utils::{generate_uuid, iso_timestamp};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A running execution started with [`Orchestrator::start`].
#[derive(Debug)]
pub struct ExecutionHandle {
    /// The execution ID, usable for decisions and status queries while the
    /// execution runs.
    pub execution_id: Uuid,
    handle: JoinHandle<PipelineExecution>,
}

impl ExecutionHandle {
    /// Waits for the execution to reach a terminal status.
    ///
    /// # Errors
    ///
    /// Returns `DeployflowError::Internal` if the execution task panicked.
    pub async fn wait(self) -> Result<PipelineExecution> {
        self.handle
            .await
            .map_err(|e| DeployflowError::Internal(format!("execution task failed: {e}")))
    }

    /// Returns true once the execution task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// How a run-order group ended.
enum GroupOutcome {
    Completed,
    Failed(FailureInfo),
}

/// Drives pipeline executions from trigger to terminal status.
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    tracked: SourceConfig,
    approvals: Arc<ApprovalService>,
    artifacts: Arc<dyn ArtifactStore>,
    store: Arc<dyn ExecutionStore>,
    event_sink: Arc<dyn EventSink>,
    cancellations: CancellationRegistry,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.pipeline.name())
            .field("tracked", &self.tracked)
            .field("in_flight", &self.cancellations.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator for `pipeline`, triggered by pushes to `tracked`.
    ///
    /// Uses in-memory artifact and execution stores and discards events.
    #[must_use]
    pub fn new(pipeline: Pipeline, tracked: SourceConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            tracked,
            approvals: Arc::new(ApprovalService::new()),
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            store: Arc::new(InMemoryExecutionStore::new()),
            event_sink: Arc::new(NoOpEventSink),
            cancellations: CancellationRegistry::new(),
        }
    }

    /// Validates `config` and builds the standard topology around
    /// `collaborators`.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid configuration and a validation
    /// error if the topology cannot be built.
    pub fn from_config(config: &PipelineConfig, collaborators: &Collaborators) -> Result<Self> {
        config.validate()?;
        let pipeline = standard_pipeline(config, collaborators)?;
        Ok(Self::new(pipeline, config.app_source.clone())
            .with_approvals(Arc::clone(&collaborators.approvals)))
    }

    /// Sets the approval service decisions are routed to. It must be the
    /// service the pipeline's approval actions wait on.
    #[must_use]
    pub fn with_approvals(mut self, approvals: Arc<ApprovalService>) -> Self {
        self.approvals = approvals;
        self
    }

    /// Sets the artifact store.
    #[must_use]
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = store;
        self
    }

    /// Sets the execution store.
    #[must_use]
    pub fn with_execution_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The pipeline being run.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The approval service.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalService> {
        &self.approvals
    }

    /// Runs an execution for `event` to a terminal status.
    ///
    /// A failed, rejected or cancelled execution is still `Ok`; inspect its
    /// status and failure info.
    ///
    /// # Errors
    ///
    /// Returns `DeployflowError::TriggerIgnored` if the event does not start
    /// an execution, or a store error if the initial record cannot be saved.
    pub async fn trigger(&self, event: SourceEvent) -> Result<PipelineExecution> {
        let (execution, token) = self.prepare(event).await?;
        Ok(self.run(execution, token).await)
    }

    /// Starts an execution on the runtime and returns without waiting.
    ///
    /// The record is saved before this returns, so status queries, decisions
    /// and cancellation work immediately.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::trigger`].
    pub async fn start(self: &Arc<Self>, event: SourceEvent) -> Result<ExecutionHandle> {
        let (execution, token) = self.prepare(event).await?;
        let execution_id = execution.execution_id;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(execution, token).await });
        Ok(ExecutionHandle {
            execution_id,
            handle,
        })
    }

    /// Applies an approval decision. Only the first decision per execution
    /// takes effect.
    ///
    /// # Errors
    ///
    /// Returns `DecisionError::NotFound` if the execution has no approval
    /// request and `DecisionError::AlreadyResolved` for every later decision.
    pub fn decide(&self, decision: DecisionRequest) -> Result<ApprovalRecord> {
        Ok(self.approvals.decide(decision)?)
    }

    /// The approval record of an execution.
    #[must_use]
    pub fn approval(&self, execution_id: Uuid) -> Option<ApprovalRecord> {
        self.approvals.get(execution_id)
    }

    /// Requests cancellation. Takes effect at the next stage or run-order
    /// boundary; a running action, including a pending approval, is not
    /// interrupted.
    ///
    /// Returns false if the execution already finished or was already
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DeployflowError::ExecutionNotFound` for unknown executions.
    pub async fn cancel(&self, execution_id: Uuid, reason: impl Into<String>) -> Result<bool> {
        if self.cancellations.cancel(execution_id, reason) {
            info!(%execution_id, "Cancellation requested");
            return Ok(true);
        }
        match self.store.load(execution_id).await? {
            Some(_) => Ok(false),
            None => Err(DeployflowError::ExecutionNotFound(execution_id)),
        }
    }

    /// The current record of an execution.
    ///
    /// # Errors
    ///
    /// Returns `DeployflowError::ExecutionNotFound` for unknown executions.
    pub async fn execution(&self, execution_id: Uuid) -> Result<PipelineExecution> {
        self.store
            .load(execution_id)
            .await?
            .ok_or(DeployflowError::ExecutionNotFound(execution_id))
    }

    /// Every execution that delivered `commit_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the records cannot be read.
    pub async fn executions_for_commit(&self, commit_id: &str) -> Result<Vec<PipelineExecution>> {
        self.store.list_by_commit(commit_id).await
    }

    async fn prepare(&self, event: SourceEvent) -> Result<(PipelineExecution, Arc<CancellationToken>)> {
        let commit_id = match event.admit(&self.tracked) {
            Ok(commit_id) => commit_id,
            Err(e) => {
                info!(trigger = event.kind(), reason = %e, "Trigger ignored");
                return Err(e);
            }
        };
        let execution = PipelineExecution::new(generate_uuid(), &self.pipeline, event, commit_id);
        self.store.save(&execution).await?;
        let token = self.cancellations.register(execution.execution_id);
        Ok((execution, token))
    }

    async fn run(&self, execution: PipelineExecution, token: Arc<CancellationToken>) -> PipelineExecution {
        let execution_id = execution.execution_id;
        let span = info_span!(
            "execution",
            %execution_id,
            pipeline = %self.pipeline.name(),
            trigger = execution.trigger.kind(),
        );
        let execution = self.run_stages(execution, &token).instrument(span).await;
        self.cancellations.remove(execution_id);
        let released = self.artifacts.release(execution_id).await;
        debug!(%execution_id, released, "Artifacts released");
        execution
    }

    async fn run_stages(&self, mut execution: PipelineExecution, token: &Arc<CancellationToken>) -> PipelineExecution {
        let timer = SpanTimer::start("execution");
        let execution_id = execution.execution_id;
        let pipeline = Arc::clone(&self.pipeline);
        let mut identity = ExecutionIdentity::new(pipeline.name()).with_execution_id(execution_id);
        identity.commit_id.clone_from(&execution.commit_id);
        let mut prior: Vec<PriorOutput> = Vec::new();

        let attributes = ExecutionSpanAttributes::new()
            .with_pipeline(pipeline.name())
            .with_execution_id(execution_id.to_string())
            .with_commit_id(execution.commit_id.as_deref())
            .with_trigger(execution.trigger.kind());
        info!(attributes = ?attributes.to_attributes(), "Execution started");
        self.emit(PipelineEvent::execution_started(
            execution_id,
            pipeline.name(),
            execution.commit_id.as_deref(),
        ))
        .await;

        for stage in pipeline.stages() {
            if self.halt_if_cancelled(&mut execution, stage, token).await {
                return execution;
            }

            if let Some(record) = execution.stage_mut(&stage.name) {
                record.status = StageStatus::Running;
                record.started_at = Some(iso_timestamp());
            }
            info!(stage = %stage.name, "Stage started");
            self.emit(PipelineEvent::stage_started(execution_id, &stage.name)).await;
            self.persist(&mut execution).await;

            for (run_order, group) in stage.run_order_groups() {
                if self.halt_if_cancelled(&mut execution, stage, token).await {
                    return execution;
                }

                let outcome = self
                    .run_group(&mut execution, &mut identity, &mut prior, stage, run_order, &group, token)
                    .await;
                self.persist(&mut execution).await;

                if let GroupOutcome::Failed(failure) = outcome {
                    self.halt_failed(&mut execution, failure).await;
                    return execution;
                }
            }

            if let Some(record) = execution.stage_mut(&stage.name) {
                record.status = StageStatus::Succeeded;
                record.finished_at = Some(iso_timestamp());
            }
            info!(stage = %stage.name, "Stage completed");
            self.emit(PipelineEvent::stage_completed(execution_id, &stage.name)).await;
            self.persist(&mut execution).await;
        }

        let duration_ms = timer.finish();
        execution.finish(ExecutionStatus::Succeeded);
        info!(promotion = %execution.promotion, duration_ms, "Execution succeeded");
        self.emit(PipelineEvent::execution_succeeded(execution_id, duration_ms)).await;
        self.persist(&mut execution).await;
        execution
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_group(
        &self,
        execution: &mut PipelineExecution,
        identity: &mut ExecutionIdentity,
        prior: &mut Vec<PriorOutput>,
        stage: &StageSpec,
        run_order: u32,
        group: &[&ActionSpec],
        token: &Arc<CancellationToken>,
    ) -> GroupOutcome {
        let execution_id = execution.execution_id;

        for action in group {
            if let Some(milestone) = stage.milestone_for(action) {
                if !execution.promotion.permits(milestone) {
                    let message = format!(
                        "'{}' would reach {milestone} but the execution is {}",
                        action.name, execution.promotion
                    );
                    warn!(stage = %stage.name, action = %action.name, %message, "Promotion precondition failed");
                    let output = ActionOutput::fail(FailureKind::Promotion, message);
                    self.record_result(execution, stage, action, &output, 0.0).await;
                    return GroupOutcome::Failed(failure_from(stage, action, &output));
                }
            }
        }

        let mut running = FuturesUnordered::new();
        for (index, action) in group.iter().enumerate() {
            if let Some(record) = execution.action_mut(&action.name) {
                record.start();
            }
            debug!(stage = %stage.name, action = %action.name, run_order, "Action started");
            self.emit(PipelineEvent::action_started(execution_id, &stage.name, &action.name, run_order))
                .await;

            let ctx = ActionContext::new(identity.clone(), &stage.name, &action.name)
                .with_run_order(run_order)
                .with_environment(stage.environment.clone())
                .with_declared_inputs(action.inputs.iter().cloned())
                .with_inputs(ActionInputs::new(stage.name.clone(), prior.clone()))
                .with_artifact_store(Arc::clone(&self.artifacts))
                .with_event_sink(Arc::clone(&self.event_sink))
                .with_cancellation(Arc::clone(token));
            let runner = Arc::clone(&action.runner);
            let span = info_span!("action", stage = %stage.name, action = %action.name, run_order);
            let handle = tokio::spawn(
                async move {
                    let timer = SpanTimer::start(ctx.action().to_string());
                    let output = runner.execute(&ctx).await;
                    (output, timer.finish())
                }
                .instrument(span),
            );
            running.push(async move { (index, handle.await) });
        }
        self.persist(execution).await;

        let mut first_failure = None;
        while let Some((index, joined)) = running.next().await {
            let action = group[index];
            let (output, duration_ms) = joined.unwrap_or_else(|e| {
                (
                    ActionOutput::fail(FailureKind::Internal, format!("action task failed: {e}")),
                    0.0,
                )
            });
            let output = self.publish_artifacts(execution_id, action, output).await;
            self.record_result(execution, stage, action, &output, duration_ms).await;

            if output.is_failure() {
                first_failure.get_or_insert_with(|| failure_from(stage, action, &output));
                continue;
            }

            if action.kind == ActionKind::Source && execution.commit_id.is_none() {
                if let Some(commit_id) = output.get_str(keys::COMMIT_ID) {
                    info!(commit_id, "Commit resolved from source");
                    execution.commit_id = Some(commit_id.to_string());
                    identity.commit_id = Some(commit_id.to_string());
                }
            }

            if let Some(milestone) = stage.milestone_for(action) {
                let from = execution.promotion;
                match from.advance(milestone) {
                    Ok(to) => {
                        execution.promotion = to;
                        info!(%from, %to, "Promotion advanced");
                        self.emit(PipelineEvent::promotion_advanced(
                            execution_id,
                            &from.to_string(),
                            &to.to_string(),
                        ))
                        .await;
                    }
                    Err(e) => {
                        let output = ActionOutput::fail(FailureKind::Promotion, e.to_string());
                        first_failure.get_or_insert_with(|| failure_from(stage, action, &output));
                    }
                }
            }

            prior.push(PriorOutput {
                stage: stage.name.clone(),
                action: action.name.clone(),
                data: output.data,
            });
        }

        first_failure.map_or(GroupOutcome::Completed, GroupOutcome::Failed)
    }

    /// Publishes a successful action's artifacts. Undeclared or rejected
    /// artifacts turn the output into an artifact failure.
    async fn publish_artifacts(&self, execution_id: Uuid, action: &ActionSpec, output: ActionOutput) -> ActionOutput {
        if output.is_failure() {
            return output;
        }
        for artifact in &output.artifacts {
            if !action.produces(&artifact.name) {
                let err = ArtifactError::Undeclared {
                    action: action.name.clone(),
                    name: artifact.name.clone(),
                };
                return ActionOutput::fail(FailureKind::Artifact, err.to_string());
            }
            match self.artifacts.publish(execution_id, &action.name, artifact.clone()).await {
                Ok(stored) => {
                    debug!(artifact = %artifact.name, version = %artifact.version, hash = %stored.content_hash, "Artifact published");
                }
                Err(e) => return ActionOutput::fail(FailureKind::Artifact, e.to_string()),
            }
        }
        output
    }

    async fn record_result(
        &self,
        execution: &mut PipelineExecution,
        stage: &StageSpec,
        action: &ActionSpec,
        output: &ActionOutput,
        duration_ms: f64,
    ) {
        let execution_id = execution.execution_id;
        if let Some(record) = execution.action_mut(&action.name) {
            record.finish(output, duration_ms);
        }

        if output.is_success() {
            info!(stage = %stage.name, action = %action.name, duration_ms, "Action succeeded");
            self.emit(PipelineEvent::action_succeeded(execution_id, &stage.name, &action.name, duration_ms))
                .await;
        } else {
            let kind = output.failure_kind.unwrap_or(FailureKind::Internal);
            let error = output.error.as_deref().unwrap_or("action failed");
            warn!(stage = %stage.name, action = %action.name, %kind, error, "Action failed");
            self.emit(PipelineEvent::action_failed(
                execution_id,
                &stage.name,
                &action.name,
                &kind.to_string(),
                error,
            ))
            .await;
        }
    }

    async fn halt_failed(&self, execution: &mut PipelineExecution, failure: FailureInfo) {
        let execution_id = execution.execution_id;
        if let Some(record) = execution.stage_mut(&failure.stage) {
            record.status = StageStatus::Failed;
            record.finished_at = Some(iso_timestamp());
        }
        execution.skip_remaining();
        execution.finish(ExecutionStatus::Failed);

        warn!(
            stage = %failure.stage,
            action = failure.action.as_deref().unwrap_or("-"),
            kind = %failure.kind,
            promotion = %execution.promotion,
            "Execution failed"
        );
        self.emit(PipelineEvent::stage_failed(execution_id, &failure.stage, &failure.message))
            .await;
        self.emit(PipelineEvent::execution_failed(
            execution_id,
            &failure.stage,
            failure.action.as_deref(),
            &failure.message,
        ))
        .await;
        execution.failure = Some(failure);
        self.persist(execution).await;
    }

    /// Ends the execution as cancelled if its token was triggered. The
    /// current stage is failed if any of its actions ran, skipped otherwise.
    async fn halt_if_cancelled(
        &self,
        execution: &mut PipelineExecution,
        stage: &StageSpec,
        token: &CancellationToken,
    ) -> bool {
        if !token.is_cancelled() {
            return false;
        }
        let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
        let execution_id = execution.execution_id;

        if let Some(record) = execution.stage_mut(&stage.name) {
            if record.status == StageStatus::Running {
                record.status = if record.has_started_actions() {
                    StageStatus::Failed
                } else {
                    StageStatus::Skipped
                };
                record.finished_at = Some(iso_timestamp());
            }
        }
        execution.skip_remaining();
        execution.failure = Some(FailureInfo {
            stage: stage.name.clone(),
            action: None,
            kind: FailureKind::Cancelled,
            message: reason.clone(),
        });
        execution.finish(ExecutionStatus::Cancelled);

        info!(stage = %stage.name, %reason, "Execution cancelled");
        self.emit(PipelineEvent::execution_cancelled(execution_id, &reason)).await;
        self.persist(execution).await;
        true
    }

    async fn emit(&self, event: PipelineEvent) {
        self.event_sink.emit(&event).await;
    }

    /// Saves the record. Failures are logged; the execution keeps running.
    async fn persist(&self, execution: &mut PipelineExecution) {
        execution.touch();
        if let Err(e) = self.store.save(execution).await {
            warn!(execution_id = %execution.execution_id, error = %e, "Failed to persist execution");
        }
    }
}

fn failure_from(stage: &StageSpec, action: &ActionSpec, output: &ActionOutput) -> FailureInfo {
    FailureInfo {
        stage: stage.name.clone(),
        action: Some(action.name.clone()),
        kind: output.failure_kind.unwrap_or(FailureKind::Internal),
        message: output
            .error
            .clone()
            .unwrap_or_else(|| format!("action '{}' failed", action.name)),
    }
}
