//! Action output type with factory methods.

use super::{ActionStatus, Artifact, FailureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known output data keys.
pub mod keys {
    /// Application commit resolved by the source action.
    pub const COMMIT_ID: &str = "commit_id";
    /// Infrastructure commit resolved by the source action.
    pub const INFRA_COMMIT_ID: &str = "infra_commit_id";
    /// Version tag bound into a deployment.
    pub const VERSION_TAG: &str = "version_tag";
    /// Endpoint of a deployed environment.
    pub const ENDPOINT: &str = "endpoint";
    /// Environment an action targeted.
    pub const ENVIRONMENT: &str = "environment";
    /// Role an action ran under.
    pub const ROLE: &str = "role";
}

/// The output of one action execution.
///
/// Outputs are either succeeded or failed. A failure always carries a
/// [`FailureKind`] so operators can tell a broken build from a rejected
/// approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Succeeded or failed.
    pub status: ActionStatus,

    /// Data visible to later actions in the same stage and to status queries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,

    /// Artifacts to publish under this action's ownership.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure classification (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl Default for ActionOutput {
    fn default() -> Self {
        Self::ok()
    }
}

impl ActionOutput {
    /// Creates a successful output with no data.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: ActionStatus::Succeeded,
            data: BTreeMap::new(),
            artifacts: Vec::new(),
            error: None,
            failure_kind: None,
        }
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::ok().with_data(key, value)
    }

    /// Creates a failure output.
    #[must_use]
    pub fn fail(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            data: BTreeMap::new(),
            artifacts: Vec::new(),
            error: Some(error.into()),
            failure_kind: Some(kind),
        }
    }

    /// Adds a data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Adds an artifact to publish.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the action failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Gets a data value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string data value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = ActionOutput::ok_value(keys::ENDPOINT, serde_json::json!("https://x"))
            .with_artifact(Artifact::new("AppCode", "abc"));

        assert!(output.is_success());
        assert_eq!(output.get_str(keys::ENDPOINT), Some("https://x"));
        assert_eq!(output.artifacts.len(), 1);
        assert!(output.failure_kind.is_none());
    }

    #[test]
    fn test_fail_output() {
        let output = ActionOutput::fail(FailureKind::SmokeTest, "1 of 2 checks failed");

        assert!(output.is_failure());
        assert_eq!(output.failure_kind, Some(FailureKind::SmokeTest));
        assert_eq!(output.error.as_deref(), Some("1 of 2 checks failed"));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ActionOutput::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "succeeded"}));
    }
}
