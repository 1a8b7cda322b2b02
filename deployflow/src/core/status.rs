//! Status, kind and failure classification enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Fetches source trees and publishes them as artifacts.
    Source,
    /// Packages the application and provisions an environment.
    BuildDeploy,
    /// Verifies a freshly deployed environment.
    SmokeTest,
    /// Waits for a human decision.
    Approval,
    /// Any other unit of work; never moves the promotion state.
    Custom,
}

impl Default for ActionKind {
    fn default() -> Self {
        Self::Custom
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::BuildDeploy => write!(f, "build_deploy"),
            Self::SmokeTest => write!(f, "smoke_test"),
            Self::Approval => write!(f, "approval"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// The execution status of an action or a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Not started yet.
    Pending,
    /// Currently running.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with a failure.
    Failed,
    /// Never started because the execution halted first.
    Skipped,
}

/// Stages share the action status lifecycle.
pub type StageStatus = ActionStatus;

impl Default for ActionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl ActionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if the action has begun (running or finished).
    #[must_use]
    pub fn has_started(&self) -> bool {
        matches!(self, Self::Running | Self::Succeeded | Self::Failed)
    }
}

/// Overall status of a pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Stages are still being advanced.
    Running,
    /// Every stage completed.
    Succeeded,
    /// An action failed and the execution halted.
    Failed,
    /// An operator cancelled the execution at a run-order boundary.
    Cancelled,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true once the execution can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Why an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Source control could not be reached.
    SourceFetch,
    /// Compiling or packaging failed.
    Build,
    /// Provisioning the environment failed.
    Provisioning,
    /// The environment deployed but failed verification.
    SmokeTest,
    /// A human rejected the promotion.
    ApprovalRejected,
    /// Nobody decided before the approval expired.
    ApprovalExpired,
    /// An artifact read or write violated ownership rules.
    Artifact,
    /// The action would have skipped a promotion state.
    Promotion,
    /// The execution was cancelled.
    Cancelled,
    /// Anything else.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFetch => write!(f, "source_fetch"),
            Self::Build => write!(f, "build"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::SmokeTest => write!(f, "smoke_test"),
            Self::ApprovalRejected => write!(f, "approval_rejected"),
            Self::ApprovalExpired => write!(f, "approval_expired"),
            Self::Artifact => write!(f, "artifact"),
            Self::Promotion => write!(f, "promotion"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl FailureKind {
    /// Returns true if a fresh trigger is likely to succeed without a code change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceFetch)
    }

    /// Returns false for deliberate halts that are not system faults.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        !matches!(
            self,
            Self::ApprovalRejected | Self::ApprovalExpired | Self::Cancelled
        )
    }
}
