//! Mock collaborators and actions for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actions::{
    Action, CheckResult, DeployBackend, DeployReceipt, DeployRequest, SmokeReport,
    SmokeTestRequest, SmokeTestRunner, SourceProvider, SourceRevision,
};
use crate::approval::{ApprovalNotification, ApprovalNotifier};
use crate::context::ActionContext;
use crate::core::{ActionKind, ActionOutput, FailureKind};
use crate::errors::{DeployError, NotifyError, SmokeTestError, SourceError};

/// Source control that serves configured heads and files.
#[derive(Debug, Default)]
pub struct MockSourceProvider {
    heads: HashMap<String, String>,
    files: HashMap<String, BTreeMap<String, Vec<u8>>>,
    unreachable: HashSet<String>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl MockSourceProvider {
    /// Head commit of repositories without a configured head.
    pub const DEFAULT_HEAD: &'static str = "0000000";

    /// Creates a provider where every repository is reachable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the branch head of a repository.
    #[must_use]
    pub fn with_head(mut self, repository: impl Into<String>, commit_id: impl Into<String>) -> Self {
        self.heads.insert(repository.into(), commit_id.into());
        self
    }

    /// Adds a file to a repository.
    #[must_use]
    pub fn with_file(
        mut self,
        repository: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.files
            .entry(repository.into())
            .or_default()
            .insert(path.into(), content.into());
        self
    }

    /// Makes a repository unreachable.
    #[must_use]
    pub fn unreachable(mut self, repository: impl Into<String>) -> Self {
        self.unreachable.insert(repository.into());
        self
    }

    /// Fetches received so far as `(repository, requested commit)`.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SourceProvider for MockSourceProvider {
    async fn fetch(
        &self,
        repository: &str,
        branch: &str,
        commit: Option<&str>,
    ) -> Result<SourceRevision, SourceError> {
        self.requests
            .lock()
            .push((repository.to_string(), commit.map(str::to_string)));

        if self.unreachable.contains(repository) {
            return Err(SourceError::Unreachable {
                repository: repository.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let commit_id = match commit {
            Some(commit) => commit.to_string(),
            None => self
                .heads
                .get(repository)
                .cloned()
                .unwrap_or_else(|| Self::DEFAULT_HEAD.to_string()),
        };
        Ok(SourceRevision {
            repository: repository.to_string(),
            branch: branch.to_string(),
            commit_id,
            files: self.files.get(repository).cloned().unwrap_or_default(),
        })
    }
}

/// Deploy backend that records requests and fails on demand.
#[derive(Debug, Default)]
pub struct MockDeployBackend {
    build_failures: HashMap<String, String>,
    provisioning_failures: HashMap<String, String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<DeployRequest>>,
}

impl MockDeployBackend {
    /// Creates a backend where every deployment succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails builds for an environment.
    #[must_use]
    pub fn failing_build(mut self, environment: impl Into<String>, message: impl Into<String>) -> Self {
        self.build_failures.insert(environment.into(), message.into());
        self
    }

    /// Fails provisioning for an environment.
    #[must_use]
    pub fn failing_provisioning(mut self, environment: impl Into<String>, message: impl Into<String>) -> Self {
        self.provisioning_failures
            .insert(environment.into(), message.into());
        self
    }

    /// Makes every deployment take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for one environment.
    #[must_use]
    pub fn requests_for(&self, environment: &str) -> Vec<DeployRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.environment == environment)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DeployBackend for MockDeployBackend {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployReceipt, DeployError> {
        let sequence = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.build_failures.get(&request.environment) {
            return Err(DeployError::Build(message.clone()));
        }
        if let Some(message) = self.provisioning_failures.get(&request.environment) {
            return Err(DeployError::Provisioning(message.clone()));
        }
        Ok(DeployReceipt {
            endpoint: Some(format!("https://{}.example.internal", request.environment)),
            deployment_id: Some(format!("deploy-{sequence}")),
        })
    }
}

/// Smoke-test runner that passes every check unless told otherwise.
#[derive(Debug, Default)]
pub struct MockSmokeTestRunner {
    failing: HashSet<(String, String)>,
    unavailable: HashSet<String>,
    requests: Mutex<Vec<SmokeTestRequest>>,
}

impl MockSmokeTestRunner {
    /// Creates a runner where every check passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the named check in an environment.
    #[must_use]
    pub fn failing_check(mut self, environment: impl Into<String>, check: impl Into<String>) -> Self {
        self.failing.insert((environment.into(), check.into()));
        self
    }

    /// Makes the runner itself fail for an environment.
    #[must_use]
    pub fn unavailable(mut self, environment: impl Into<String>) -> Self {
        self.unavailable.insert(environment.into());
        self
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<SmokeTestRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SmokeTestRunner for MockSmokeTestRunner {
    async fn run(&self, request: &SmokeTestRequest) -> Result<SmokeReport, SmokeTestError> {
        self.requests.lock().push(request.clone());
        if self.unavailable.contains(&request.environment) {
            return Err(SmokeTestError(format!("runner unavailable for '{}'", request.environment)));
        }

        let results = request
            .checks
            .iter()
            .map(|check| {
                if self
                    .failing
                    .contains(&(request.environment.clone(), check.name.clone()))
                {
                    CheckResult::failed(&check.name, Some(500), "internal server error")
                } else {
                    CheckResult::passed(&check.name, check.expected_status)
                }
            })
            .collect();
        Ok(SmokeReport { results })
    }
}

/// Notifier that keeps every notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<ApprovalNotification>>,
}

impl RecordingNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications sent so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<ApprovalNotification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl ApprovalNotifier for RecordingNotifier {
    async fn notify(&self, notification: &ApprovalNotification) -> Result<(), NotifyError> {
        self.notifications.lock().push(notification.clone());
        Ok(())
    }
}

/// When one action ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpan {
    /// Action name.
    pub action: String,
    /// When `execute` was entered.
    pub started: Instant,
    /// When `execute` returned.
    pub finished: Instant,
}

impl ActionSpan {
    /// Returns true if the two spans share any instant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Shared timeline of action spans, in completion order.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    spans: Arc<Mutex<Vec<ActionSpan>>>,
}

impl ActionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded span.
    #[must_use]
    pub fn spans(&self) -> Vec<ActionSpan> {
        self.spans.lock().clone()
    }

    /// The span of a named action.
    #[must_use]
    pub fn span(&self, action: &str) -> Option<ActionSpan> {
        self.spans.lock().iter().find(|s| s.action == action).cloned()
    }

    fn record(&self, span: ActionSpan) {
        self.spans.lock().push(span);
    }
}

/// An action that succeeds, optionally after a delay, and records its span.
#[derive(Debug)]
pub struct RecordingAction {
    name: String,
    kind: ActionKind,
    delay: Option<Duration>,
    data: BTreeMap<String, serde_json::Value>,
    log: ActionLog,
    calls: Mutex<usize>,
}

impl RecordingAction {
    /// Creates a custom action with a private log.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Custom,
            delay: None,
            data: BTreeMap::new(),
            log: ActionLog::new(),
            calls: Mutex::new(0),
        }
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Makes the action take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Adds a value to the output.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Records into a shared log.
    #[must_use]
    pub fn with_log(mut self, log: ActionLog) -> Self {
        self.log = log;
        self
    }

    /// Number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Action for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
        *self.calls.lock() += 1;
        let started = Instant::now();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.record(ActionSpan {
            action: self.name.clone(),
            started,
            finished: Instant::now(),
        });

        let mut output = ActionOutput::ok();
        output.data.clone_from(&self.data);
        output
    }
}

/// An action that always fails.
#[derive(Debug)]
pub struct FailingAction {
    name: String,
    kind: ActionKind,
    failure: FailureKind,
    error: String,
}

impl FailingAction {
    /// Creates a custom action failing with `failure`.
    #[must_use]
    pub fn new(name: impl Into<String>, failure: FailureKind, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Custom,
            failure,
            error: error.into(),
        }
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl Action for FailingAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
        ActionOutput::fail(self.failure, self.error.clone())
    }
}
