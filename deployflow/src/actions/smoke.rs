//! Smoke-test action: black-box checks against a freshly deployed environment.

use super::Action;
use crate::config::{SmokeCheck, SmokeSuiteConfig};
use crate::context::ActionContext;
use crate::core::{keys, ActionKind, ActionOutput, FailureKind, APP_CODE};
use crate::errors::SmokeTestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A suite run against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeTestRequest {
    /// The execution being verified.
    pub execution_id: Uuid,
    /// Environment name.
    pub environment: String,
    /// Base URL of the deployed environment.
    pub endpoint: String,
    /// Version the environment should be running.
    pub version_tag: String,
    /// Checks to run.
    pub checks: Vec<SmokeCheck>,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Observed status, if a response arrived.
    pub status: Option<u16>,
    /// Failure detail.
    pub detail: Option<String>,
}

impl CheckResult {
    /// A passing result.
    #[must_use]
    pub fn passed(name: impl Into<String>, status: u16) -> Self {
        Self {
            name: name.into(),
            passed: true,
            status: Some(status),
            detail: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn failed(name: impl Into<String>, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            status,
            detail: Some(detail.into()),
        }
    }
}

/// Results of a whole suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeReport {
    /// One result per check, in suite order.
    pub results: Vec<CheckResult>,
}

impl SmokeReport {
    /// Returns true if every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// The failing checks.
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Smoke-test execution collaborator.
#[async_trait]
pub trait SmokeTestRunner: Send + Sync {
    /// Runs the suite.
    ///
    /// Individual check failures belong in the report; an error means the
    /// suite could not run at all.
    async fn run(&self, request: &SmokeTestRequest) -> Result<SmokeReport, SmokeTestError>;
}

/// Verifies the endpoint published by the stage's deploy action.
#[derive(Clone)]
pub struct SmokeTestAction {
    name: String,
    runner: Arc<dyn SmokeTestRunner>,
    suite: SmokeSuiteConfig,
}

impl SmokeTestAction {
    /// Creates a smoke-test action.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn SmokeTestRunner>, suite: SmokeSuiteConfig) -> Self {
        Self {
            name: name.into(),
            runner,
            suite,
        }
    }
}

impl std::fmt::Debug for SmokeTestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmokeTestAction")
            .field("name", &self.name)
            .field("checks", &self.suite.checks.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for SmokeTestAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::SmokeTest
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let Some(environment) = ctx.environment() else {
            return ActionOutput::fail(
                FailureKind::Internal,
                format!("stage '{}' has no environment to verify", ctx.stage()),
            );
        };
        let Some(endpoint) = ctx.stage_value(keys::ENDPOINT).and_then(serde_json::Value::as_str) else {
            return ActionOutput::fail(
                FailureKind::SmokeTest,
                format!("no endpoint was published for environment '{}'", environment.name),
            );
        };
        let app_code = match ctx.artifact(APP_CODE).await {
            Ok(artifact) => artifact,
            Err(e) => return ActionOutput::fail(FailureKind::Artifact, e.to_string()),
        };

        let request = SmokeTestRequest {
            execution_id: ctx.execution_id(),
            environment: environment.name.clone(),
            endpoint: endpoint.to_string(),
            version_tag: app_code.version,
            checks: self.suite.checks.clone(),
        };

        let report = match self.runner.run(&request).await {
            Ok(report) => report,
            Err(e) => return ActionOutput::fail(FailureKind::SmokeTest, e.to_string()),
        };
        let total = report.results.len();

        if report.passed() {
            info!(
                execution_id = %ctx.execution_id(),
                environment = %request.environment,
                checks = total,
                "Smoke tests passed"
            );
            return ActionOutput::ok_value("checks_passed", serde_json::json!(total))
                .with_data("checks_total", serde_json::json!(total))
                .with_data(keys::ENVIRONMENT, serde_json::json!(request.environment));
        }

        let failed: Vec<&str> = report.failures().map(|r| r.name.as_str()).collect();
        warn!(
            execution_id = %ctx.execution_id(),
            environment = %request.environment,
            failed = ?failed,
            "Smoke tests failed"
        );
        ActionOutput::fail(
            FailureKind::SmokeTest,
            format!(
                "{} of {} checks failed in '{}': {}",
                failed.len(),
                total,
                request.environment,
                failed.join(", ")
            ),
        )
        .with_data("checks_passed", serde_json::json!(total - failed.len()))
        .with_data("checks_total", serde_json::json!(total))
    }
}

/// Runs checks as real HTTP requests.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpSmokeTestRunner {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpSmokeTestRunner {
    /// Creates a runner with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner with a custom client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn url(endpoint: &str, path: &str) -> String {
        format!("{}{}", endpoint.trim_end_matches('/'), path)
    }

    async fn run_check(&self, endpoint: &str, check: &SmokeCheck) -> CheckResult {
        let method = match reqwest::Method::from_bytes(check.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => return CheckResult::failed(&check.name, None, format!("invalid method '{}'", check.method)),
        };
        match self
            .client
            .request(method, Self::url(endpoint, &check.path))
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                if status == check.expected_status {
                    CheckResult::passed(&check.name, status)
                } else {
                    CheckResult::failed(
                        &check.name,
                        Some(status),
                        format!("expected {}, got {status}", check.expected_status),
                    )
                }
            }
            Err(e) => CheckResult::failed(&check.name, None, e.to_string()),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl SmokeTestRunner for HttpSmokeTestRunner {
    async fn run(&self, request: &SmokeTestRequest) -> Result<SmokeReport, SmokeTestError> {
        let mut results = Vec::with_capacity(request.checks.len());
        for check in &request.checks {
            results.push(self.run_check(&request.endpoint, check).await);
        }
        Ok(SmokeReport { results })
    }
}
