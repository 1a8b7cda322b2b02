//! Error types for deployflow.
//!
//! Pipeline-level failures (a broken build, a failing smoke check, a rejected
//! approval) are not errors here: they are recorded on the action output with a
//! [`FailureKind`](crate::core::FailureKind) and halt the execution. The types in
//! this module cover misuse of the API, invalid topologies and collaborator
//! faults that the orchestrator converts into action failures.

use crate::approval::ApprovalState;
use crate::environment::{Milestone, PromotionState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the crate.
pub type Result<T, E = DeployflowError> = std::result::Result<T, E>;

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployflowError {
    /// The pipeline topology is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// An artifact could not be read or written.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// An approval decision was rejected.
    #[error("{0}")]
    Decision(#[from] DecisionError),

    /// A promotion transition was attempted out of order.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A source event did not start an execution.
    #[error("Trigger ignored: {0}")]
    TriggerIgnored(String),

    /// No execution exists with the given id.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// The execution store failed.
    #[error("Execution store error: {0}")]
    Store(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-GATE_ORDER").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Creates error info whose fix hint comes from [`ContractSuggestions`].
    #[must_use]
    pub fn for_code(code: &str, summary: impl Into<String>) -> Self {
        let info = Self::new(code, summary);
        match ContractSuggestions::get(code) {
            Some(hint) => info.with_fix_hint(hint),
            None => info,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline topology fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Creates an error tagged with a code from [`ContractSuggestions`].
    #[must_use]
    pub fn with_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(message.clone()).with_error_info(ContractErrorInfo::for_code(code, message))
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Errors raised by the artifact store or by undeclared artifact access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// No artifact with this name exists for the execution.
    #[error("Artifact not found: {name}")]
    NotFound {
        /// The artifact name.
        name: String,
    },

    /// The action did not declare the artifact as an input or output.
    #[error("Action '{action}' did not declare artifact '{name}'")]
    Undeclared {
        /// The accessing action.
        action: String,
        /// The artifact name.
        name: String,
    },

    /// Another action already owns the artifact.
    #[error("Artifact '{name}' is owned by '{owner}', '{writer}' cannot write it")]
    NotOwner {
        /// The artifact name.
        name: String,
        /// The producing action.
        owner: String,
        /// The action attempting the write.
        writer: String,
    },

    /// The artifact was already read downstream and can no longer change.
    #[error("Artifact '{name}' is sealed")]
    Sealed {
        /// The artifact name.
        name: String,
    },
}

/// Errors returned by the approval decision API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    /// No approval request exists for the execution.
    #[error("No approval request for execution {execution_id}")]
    NotFound {
        /// The execution id.
        execution_id: Uuid,
    },

    /// The request was already resolved; the decision was not applied.
    #[error("Approval for execution {execution_id} already resolved as {state}")]
    AlreadyResolved {
        /// The execution id.
        execution_id: Uuid,
        /// The terminal state of the request.
        state: ApprovalState,
    },

    /// An approval request already exists for the execution.
    #[error("Approval already requested for execution {execution_id}")]
    AlreadyRequested {
        /// The execution id.
        execution_id: Uuid,
    },
}

/// Error raised when a promotion milestone is applied out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot apply {milestone} in state {from}")]
pub struct TransitionError {
    /// The state the execution was in.
    pub from: PromotionState,
    /// The milestone that was attempted.
    pub milestone: Milestone,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config '{path}': {source}")]
    Read {
        /// The file path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by a [`SourceProvider`](crate::actions::SourceProvider).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The repository could not be reached.
    #[error("Source '{repository}' unreachable: {reason}")]
    Unreachable {
        /// The repository.
        repository: String,
        /// The reason.
        reason: String,
    },

    /// The requested revision does not exist.
    #[error("Revision '{revision}' not found in '{repository}'")]
    RevisionNotFound {
        /// The repository.
        repository: String,
        /// The revision.
        revision: String,
    },
}

/// Errors returned by a [`DeployBackend`](crate::actions::DeployBackend).
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    /// Compiling or packaging the application failed.
    #[error("Build failed: {0}")]
    Build(String),

    /// Provisioning the environment's resources failed.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),
}

/// Error returned when a smoke-test runner cannot execute the suite at all.
#[derive(Debug, Clone, Error)]
#[error("Smoke test runner error: {0}")]
pub struct SmokeTestError(pub String);

/// Error returned by an approval notifier.
#[derive(Debug, Clone, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Provides default suggestions for pipeline validation codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-EMPTY" => Some("Add at least one stage to the pipeline before building."),
            "PIPELINE-EMPTY_STAGE" => Some("Every stage needs at least one action."),
            "PIPELINE-DUPLICATE" => Some(
                "Stage and action names identify artifact producers and status records; \
                 rename one of them.",
            ),
            "PIPELINE-RUN_ORDER" => Some("Run orders start at 1."),
            "PIPELINE-GATE_ORDER" => Some(
                "Give the approval gate a run order higher than every other action in its stage \
                 and do not share it with other actions.",
            ),
            "PIPELINE-ENVIRONMENT" => Some(
                "Attach an environment to stages that deploy or smoke test.",
            ),
            "PIPELINE-MISSING_INPUT" => Some(
                "Inputs must be produced by an earlier stage or a lower run order in the same stage.",
            ),
            "PIPELINE-DUPLICATE_OUTPUT" => Some("Each artifact has exactly one producing action."),
            "PIPELINE-PROMOTION_PATH" => Some(
                "Order actions so the pipeline deploys to test, verifies test, waits for approval, \
                 deploys to prod and verifies prod.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "Test");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"Test".to_string()));
    }

    #[test]
    fn test_validation_error_with_code_carries_hint() {
        let err = PipelineValidationError::with_code("PIPELINE-GATE_ORDER", "gate not last")
            .with_stages(vec!["Test".to_string()]);

        assert_eq!(err.code(), Some("PIPELINE-GATE_ORDER"));
        assert!(err.error_info.unwrap().fix_hint.is_some());
        assert_eq!(err.stages, vec!["Test".to_string()]);
    }

    #[test]
    fn test_decision_error_message() {
        let id = Uuid::new_v4();
        let err = DecisionError::AlreadyResolved {
            execution_id: id,
            state: ApprovalState::Approved,
        };
        assert!(err.to_string().contains("already resolved as approved"));
    }

    #[test]
    fn test_error_conversion() {
        let err: DeployflowError = ArtifactError::Sealed {
            name: "AppCode".to_string(),
        }
        .into();
        assert!(matches!(err, DeployflowError::Artifact(_)));
    }

    #[test]
    fn test_contract_suggestions() {
        assert!(ContractSuggestions::get("PIPELINE-PROMOTION_PATH").is_some());
        assert!(ContractSuggestions::get("UNKNOWN").is_none());
    }
}
