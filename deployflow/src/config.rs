//! Configuration types for the delivery pipeline.
//!
//! Every section deserializes with defaults, so an empty JSON object yields the
//! canonical proxy-service pipeline.

use crate::errors::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Longest approval expiry accepted: one year.
pub const MAX_APPROVAL_EXPIRY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    /// Application repository; pushes to its branch trigger executions.
    #[serde(default = "default_app_source")]
    pub app_source: SourceConfig,
    /// Infrastructure repository; fetched passively, never triggers.
    #[serde(default = "default_infra_source")]
    pub infra_source: SourceConfig,
    /// Test environment.
    #[serde(default = "default_test_environment")]
    pub test: EnvironmentConfig,
    /// Prod environment.
    #[serde(default = "default_prod_environment")]
    pub prod: EnvironmentConfig,
    /// Approval gate settings.
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Smoke-test suite run against each environment.
    #[serde(default)]
    pub smoke: SmokeSuiteConfig,
    /// Run orders of the standard actions.
    #[serde(default)]
    pub run_orders: RunOrderConfig,
}

fn default_pipeline_name() -> String {
    "proxy-service-pipeline".to_string()
}

fn default_app_source() -> SourceConfig {
    SourceConfig::new("proxy-service", "main")
}

fn default_infra_source() -> SourceConfig {
    SourceConfig::new("proxy-service-infra", "main")
}

fn default_test_environment() -> EnvironmentConfig {
    EnvironmentConfig::new("test", "test-deploy-role")
}

fn default_prod_environment() -> EnvironmentConfig {
    EnvironmentConfig::new("prod", "prod-deploy-role")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            app_source: default_app_source(),
            infra_source: default_infra_source(),
            test: default_test_environment(),
            prod: default_prod_environment(),
            approval: ApprovalConfig::default(),
            smoke: SmokeSuiteConfig::default(),
            run_orders: RunOrderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and
    /// `ConfigError::Invalid` if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise the
    /// errors of [`Self::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the approval expiry.
    #[must_use]
    pub fn with_approval_expiry(mut self, seconds: u64) -> Self {
        self.approval.expiry_seconds = Some(seconds);
        self
    }

    /// Adds a smoke check.
    #[must_use]
    pub fn with_smoke_check(mut self, check: SmokeCheck) -> Self {
        self.smoke.checks.push(check);
        self
    }

    /// Checks names and run-order constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name_pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for (field, value) in [
            ("name", &self.name),
            ("app_source.repository", &self.app_source.repository),
            ("infra_source.repository", &self.infra_source.repository),
            ("test.name", &self.test.name),
            ("prod.name", &self.prod.name),
        ] {
            if !name_pattern.is_match(value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} '{value}' must start with a letter or digit and contain only \
                     letters, digits, '.', '_' or '-'"
                )));
            }
        }

        if self.app_source.branch.trim().is_empty() || self.infra_source.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("source branches must not be empty".to_string()));
        }
        if self.test.name == self.prod.name {
            return Err(ConfigError::Invalid(format!(
                "test and prod environments share the name '{}'",
                self.test.name
            )));
        }
        if self.test.role.trim().is_empty() || self.prod.role.trim().is_empty() {
            return Err(ConfigError::Invalid("environment roles must not be empty".to_string()));
        }
        match self.approval.expiry_seconds {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "approval.expiry_seconds must be positive when set".to_string(),
                ));
            }
            Some(seconds) if seconds > MAX_APPROVAL_EXPIRY_SECONDS => {
                return Err(ConfigError::Invalid(format!(
                    "approval.expiry_seconds must not exceed {MAX_APPROVAL_EXPIRY_SECONDS}"
                )));
            }
            _ => {}
        }

        self.run_orders.validate()?;

        for check in &self.smoke.checks {
            if !check.path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "smoke check '{}' path must start with '/'",
                    check.name
                )));
            }
        }
        Ok(())
    }

    /// The approval expiry as a duration, if one is configured.
    #[must_use]
    pub fn approval_expiry(&self) -> Option<Duration> {
        self.approval.expiry_seconds.map(Duration::from_secs)
    }
}

/// A source repository and tracked branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository name.
    pub repository: String,
    /// Tracked branch.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl SourceConfig {
    /// Creates a source configuration.
    #[must_use]
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
        }
    }
}

/// An environment's name, role and injected variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name.
    pub name: String,
    /// Role assumed by deploy actions targeting this environment.
    pub role: String,
    /// Variables injected into builds.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl EnvironmentConfig {
    /// Creates an environment configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Adds an injected variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Approval gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Whether to send a notification when approval is requested.
    #[serde(default = "default_notify")]
    pub notify: bool,
    /// Seconds before a pending request expires. No expiry when unset.
    #[serde(default)]
    pub expiry_seconds: Option<u64>,
    /// Message included in the notification.
    #[serde(default = "default_approval_message")]
    pub message: String,
}

fn default_notify() -> bool {
    true
}

fn default_approval_message() -> String {
    "Test environment verified; approve promotion to prod.".to_string()
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            notify: default_notify(),
            expiry_seconds: None,
            message: default_approval_message(),
        }
    }
}

/// The smoke-test suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeSuiteConfig {
    /// Checks, run in order.
    #[serde(default)]
    pub checks: Vec<SmokeCheck>,
}

/// A single black-box request and the status it must return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeCheck {
    /// Check name.
    pub name: String,
    /// HTTP method.
    #[serde(default = "default_method")]
    pub method: String,
    /// Request path, relative to the environment endpoint.
    pub path: String,
    /// Expected response status.
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

impl SmokeCheck {
    /// Creates a GET check expecting 200.
    #[must_use]
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: default_method(),
            path: path.into(),
            expected_status: default_expected_status(),
        }
    }

    /// Sets the method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the expected status.
    #[must_use]
    pub fn expecting(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }
}

/// Run orders of the standard actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOrderConfig {
    /// Build-and-deploy in both stages.
    #[serde(default = "default_deploy_order")]
    pub deploy: u32,
    /// Smoke test in the test stage.
    #[serde(default = "default_smoke_order")]
    pub smoke: u32,
    /// Approval gate in the test stage.
    #[serde(default = "default_approval_order")]
    pub approval: u32,
    /// Smoke test in the prod stage.
    #[serde(default = "default_prod_smoke_order")]
    pub prod_smoke: u32,
}

fn default_deploy_order() -> u32 {
    1
}

fn default_smoke_order() -> u32 {
    98
}

fn default_approval_order() -> u32 {
    99
}

fn default_prod_smoke_order() -> u32 {
    2
}

impl Default for RunOrderConfig {
    fn default() -> Self {
        Self {
            deploy: default_deploy_order(),
            smoke: default_smoke_order(),
            approval: default_approval_order(),
            prod_smoke: default_prod_smoke_order(),
        }
    }
}

impl RunOrderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.deploy == 0 {
            return Err(ConfigError::Invalid("run_orders.deploy must be >= 1".to_string()));
        }
        if !(self.deploy < self.smoke && self.smoke < self.approval) {
            return Err(ConfigError::Invalid(format!(
                "test stage run orders must satisfy deploy < smoke < approval (got {} / {} / {})",
                self.deploy, self.smoke, self.approval
            )));
        }
        if self.prod_smoke <= self.deploy {
            return Err(ConfigError::Invalid(format!(
                "run_orders.prod_smoke ({}) must be greater than deploy ({})",
                self.prod_smoke, self.deploy
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();

        assert_eq!(config.name, "proxy-service-pipeline");
        assert_eq!(config.app_source.branch, "main");
        assert_eq!(config.run_orders, RunOrderConfig::default());
        assert_eq!(config.run_orders.smoke, 98);
        assert_eq!(config.run_orders.approval, 99);
        assert!(config.approval.notify);
        assert!(config.approval_expiry().is_none());
    }

    #[test]
    fn test_partial_document() {
        let json = r#"{
            "app_source": {"repository": "proxy", "branch": "release"},
            "prod": {"name": "production", "role": "prod-admin", "variables": {"REGION": "eu-west-1"}},
            "approval": {"expiry_seconds": 3600},
            "smoke": {"checks": [{"name": "health", "path": "/health"}]}
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();

        assert_eq!(config.app_source.branch, "release");
        assert_eq!(config.prod.variables.get("REGION"), Some(&"eu-west-1".to_string()));
        assert_eq!(config.approval_expiry(), Some(Duration::from_secs(3600)));
        assert_eq!(config.smoke.checks[0].method, "GET");
        assert_eq!(config.smoke.checks[0].expected_status, 200);
    }

    #[test]
    fn test_rejects_gate_before_smoke() {
        let json = r#"{"run_orders": {"smoke": 99, "approval": 98}}"#;
        let err = PipelineConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("deploy < smoke < approval")));
    }

    #[test]
    fn test_rejects_invalid_names() {
        let config = PipelineConfig::new().with_name("bad name!");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_shared_environment_name() {
        let mut config = PipelineConfig::new();
        config.prod.name = "test".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_expiry() {
        assert!(PipelineConfig::new().with_approval_expiry(0).validate().is_err());
    }

    #[test]
    fn test_rejects_expiry_beyond_one_year() {
        assert!(PipelineConfig::new()
            .with_approval_expiry(MAX_APPROVAL_EXPIRY_SECONDS)
            .validate()
            .is_ok());
        assert!(PipelineConfig::new()
            .with_approval_expiry(10_000_000_000_000)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_relative_smoke_path() {
        let config = PipelineConfig::new().with_smoke_check(SmokeCheck::get("health", "health"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "from-file"}}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "from-file");
    }

    #[test]
    fn test_from_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/deployflow.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = PipelineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
