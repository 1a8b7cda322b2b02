//! The per-action execution context.

use super::{ActionInputs, ExecutionIdentity};
use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
use crate::cancellation::CancellationToken;
use crate::core::{Artifact, PipelineEvent};
use crate::environment::Environment;
use crate::errors::ArtifactError;
use crate::events::{EventSink, NoOpEventSink};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Everything an action may see while it runs.
///
/// Artifacts are only reachable through [`ActionContext::artifact`], which
/// enforces the action's declared inputs and seals what it reads.
#[derive(Clone)]
pub struct ActionContext {
    identity: ExecutionIdentity,
    stage: String,
    action: String,
    run_order: u32,
    environment: Option<Environment>,
    declared_inputs: BTreeSet<String>,
    inputs: ActionInputs,
    artifacts: Arc<dyn ArtifactStore>,
    event_sink: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
}

impl ActionContext {
    /// Creates a context with a private artifact store, no event sink and a
    /// fresh cancellation token.
    #[must_use]
    pub fn new(identity: ExecutionIdentity, stage: impl Into<String>, action: impl Into<String>) -> Self {
        let stage = stage.into();
        Self {
            identity,
            inputs: ActionInputs::new(stage.clone(), Vec::new()),
            stage,
            action: action.into(),
            run_order: 1,
            environment: None,
            declared_inputs: BTreeSet::new(),
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            event_sink: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the run order.
    #[must_use]
    pub fn with_run_order(mut self, run_order: u32) -> Self {
        self.run_order = run_order;
        self
    }

    /// Sets the target environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Option<Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the artifacts the action declared as inputs.
    #[must_use]
    pub fn with_declared_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the outputs of earlier actions.
    #[must_use]
    pub fn with_inputs(mut self, inputs: ActionInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Sets the artifact store.
    #[must_use]
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = store;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the commit.
    #[must_use]
    pub fn with_commit(mut self, commit_id: impl Into<String>) -> Self {
        self.identity.commit_id = Some(commit_id.into());
        self
    }

    /// The execution identity.
    #[must_use]
    pub fn identity(&self) -> &ExecutionIdentity {
        &self.identity
    }

    /// The execution ID.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.identity.execution_id
    }

    /// The pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.identity.pipeline
    }

    /// The commit being delivered, if known.
    #[must_use]
    pub fn commit_id(&self) -> Option<&str> {
        self.identity.commit_id.as_deref()
    }

    /// The stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The run order of the action.
    #[must_use]
    pub fn run_order(&self) -> u32 {
        self.run_order
    }

    /// The stage's environment.
    #[must_use]
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Outputs of earlier actions.
    #[must_use]
    pub fn inputs(&self) -> &ActionInputs {
        &self.inputs
    }

    /// The most recent value for `key` produced earlier in this stage.
    #[must_use]
    pub fn stage_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.inputs.stage_value(key)
    }

    /// Reads a declared input artifact. The artifact is sealed afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::Undeclared` if the action did not declare the
    /// artifact and `ArtifactError::NotFound` if nothing published it.
    pub async fn artifact(&self, name: &str) -> Result<Artifact, ArtifactError> {
        if !self.declared_inputs.contains(name) {
            return Err(ArtifactError::Undeclared {
                action: self.action.clone(),
                name: name.to_string(),
            });
        }
        self.artifacts.fetch(self.identity.execution_id, name).await
    }

    /// Returns true once cancellation was requested.
    ///
    /// The orchestrator only checks between run-order groups; long-running
    /// actions may poll this to stop early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Emits an event.
    pub async fn emit(&self, event: PipelineEvent) {
        self.event_sink.emit(&event).await;
    }

    /// Emits an event without waiting.
    pub fn try_emit(&self, event: &PipelineEvent) {
        self.event_sink.try_emit(event);
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("identity", &self.identity)
            .field("stage", &self.stage)
            .field("action", &self.action)
            .field("run_order", &self.run_order)
            .field("environment", &self.environment)
            .field("declared_inputs", &self.declared_inputs)
            .finish_non_exhaustive()
    }
}
