//! Test fixtures for running the standard pipeline against mocks.

use std::sync::Arc;
use std::time::Duration;

use super::{MockDeployBackend, MockSmokeTestRunner, MockSourceProvider, RecordingNotifier};
use crate::approval::{ApprovalRecord, ApprovalService, DecisionRequest};
use crate::config::PipelineConfig;
use crate::events::CollectingEventSink;
use crate::pipeline::{Collaborators, ExecutionHandle, Orchestrator, PipelineExecution, SourceEvent};
use uuid::Uuid;

/// The standard pipeline wired to mock collaborators.
///
/// ```rust,ignore
/// let harness = TestHarness::new();
/// let handle = harness.start("abc123").await;
/// harness.wait_for_pending_approval(handle.execution_id).await;
/// harness.approve(handle.execution_id);
/// let execution = handle.wait().await?;
/// ```
pub struct TestHarness {
    /// Configuration the pipeline was built from.
    pub config: PipelineConfig,
    /// Source control mock.
    pub source: Arc<MockSourceProvider>,
    /// Deploy backend mock.
    pub deploy: Arc<MockDeployBackend>,
    /// Smoke-test runner mock.
    pub smoke: Arc<MockSmokeTestRunner>,
    /// Notifier capturing approval requests.
    pub notifier: Arc<RecordingNotifier>,
    /// The approval service shared by the gate and the orchestrator.
    pub approvals: Arc<ApprovalService>,
    /// Every event the execution emitted.
    pub events: Arc<CollectingEventSink>,
    /// The orchestrator under test.
    pub orchestrator: Arc<Orchestrator>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// How long [`TestHarness::wait_for_pending_approval`] waits.
    pub const APPROVAL_WAIT: Duration = Duration::from_secs(5);

    /// A harness with the default configuration and well-behaved mocks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mocks(
            PipelineConfig::default(),
            MockSourceProvider::new(),
            MockDeployBackend::new(),
            MockSmokeTestRunner::new(),
        )
    }

    /// A harness with the default mocks and a custom configuration.
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_mocks(
            config,
            MockSourceProvider::new(),
            MockDeployBackend::new(),
            MockSmokeTestRunner::new(),
        )
    }

    /// A harness around the given configuration and mocks.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not produce a valid pipeline.
    #[must_use]
    pub fn with_mocks(
        config: PipelineConfig,
        source: MockSourceProvider,
        deploy: MockDeployBackend,
        smoke: MockSmokeTestRunner,
    ) -> Self {
        let source = Arc::new(source);
        let deploy = Arc::new(deploy);
        let smoke = Arc::new(smoke);
        let notifier = Arc::new(RecordingNotifier::new());
        let approvals = Arc::new(ApprovalService::new().with_notifier(notifier.clone()));
        let events = Arc::new(CollectingEventSink::new());

        let collaborators = Collaborators {
            source: source.clone(),
            deploy: deploy.clone(),
            smoke: smoke.clone(),
            approvals: approvals.clone(),
        };
        let orchestrator = match Orchestrator::from_config(&config, &collaborators) {
            Ok(orchestrator) => orchestrator.with_event_sink(events.clone()),
            Err(e) => panic!("test harness config is invalid: {e}"),
        };

        Self {
            config,
            source,
            deploy,
            smoke,
            notifier,
            approvals,
            events,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// A push of `commit_id` to the tracked branch.
    #[must_use]
    pub fn push(&self, commit_id: &str) -> SourceEvent {
        SourceEvent::push(
            &self.config.app_source.repository,
            &self.config.app_source.branch,
            commit_id,
        )
    }

    /// Starts an execution for a push of `commit_id`.
    ///
    /// # Panics
    ///
    /// Panics if the push is not admitted.
    pub async fn start(&self, commit_id: &str) -> ExecutionHandle {
        match self.orchestrator.start(self.push(commit_id)).await {
            Ok(handle) => handle,
            Err(e) => panic!("push of {commit_id} was not admitted: {e}"),
        }
    }

    /// Runs an execution for a push of `commit_id` to completion. Only
    /// terminates on its own if the run never reaches a pending approval.
    ///
    /// # Panics
    ///
    /// Panics if the push is not admitted.
    pub async fn run(&self, commit_id: &str) -> PipelineExecution {
        match self.orchestrator.trigger(self.push(commit_id)).await {
            Ok(execution) => execution,
            Err(e) => panic!("push of {commit_id} was not admitted: {e}"),
        }
    }

    /// Waits until the execution's approval request is pending.
    ///
    /// # Panics
    ///
    /// Panics if no request shows up within [`TestHarness::APPROVAL_WAIT`].
    pub async fn wait_for_pending_approval(&self, execution_id: Uuid) -> ApprovalRecord {
        let deadline = tokio::time::Instant::now() + Self::APPROVAL_WAIT;
        loop {
            if let Some(record) = self.approvals.get(execution_id) {
                return record;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no approval request for {execution_id} after {:?}",
                Self::APPROVAL_WAIT
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Approves the execution's pending request.
    ///
    /// # Panics
    ///
    /// Panics if the decision is not applied.
    pub fn approve(&self, execution_id: Uuid) -> ApprovalRecord {
        let decision = DecisionRequest::approve(execution_id).with_actor("release-manager");
        match self.orchestrator.decide(decision) {
            Ok(record) => record,
            Err(e) => panic!("approval of {execution_id} failed: {e}"),
        }
    }

    /// Rejects the execution's pending request.
    ///
    /// # Panics
    ///
    /// Panics if the decision is not applied.
    pub fn reject(&self, execution_id: Uuid, comment: &str) -> ApprovalRecord {
        let decision = DecisionRequest::reject(execution_id)
            .with_actor("release-manager")
            .with_comment(comment);
        match self.orchestrator.decide(decision) {
            Ok(record) => record,
            Err(e) => panic!("rejection of {execution_id} failed: {e}"),
        }
    }

    /// Starts a push, approves it at the gate and waits for the result.
    ///
    /// # Panics
    ///
    /// Panics if the gate is never reached or the execution task fails.
    pub async fn run_approved(&self, commit_id: &str) -> PipelineExecution {
        let handle = self.start(commit_id).await;
        self.wait_for_pending_approval(handle.execution_id).await;
        self.approve(handle.execution_id);
        match handle.wait().await {
            Ok(execution) => execution,
            Err(e) => panic!("execution of {commit_id} did not finish: {e}"),
        }
    }
}
