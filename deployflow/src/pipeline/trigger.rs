//! Source events and trigger admission.

use crate::config::SourceConfig;
use crate::errors::{DeployflowError, Result};
use serde::{Deserialize, Serialize};

/// An event that may start an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceEvent {
    /// A push to an application repository.
    Push {
        /// Repository pushed to.
        repository: String,
        /// Branch pushed to.
        branch: String,
        /// Head commit after the push.
        commit_id: String,
    },
    /// A change to the infrastructure repository. Never starts an execution.
    InfraChange {
        /// Head commit of the infrastructure repository.
        commit_id: String,
    },
    /// An operator re-run of the tracked branch head.
    Manual {
        /// Who requested the run.
        requested_by: String,
    },
}

impl SourceEvent {
    /// A push event.
    #[must_use]
    pub fn push(repository: impl Into<String>, branch: impl Into<String>, commit_id: impl Into<String>) -> Self {
        Self::Push {
            repository: repository.into(),
            branch: branch.into(),
            commit_id: commit_id.into(),
        }
    }

    /// A manual re-run.
    #[must_use]
    pub fn manual(requested_by: impl Into<String>) -> Self {
        Self::Manual {
            requested_by: requested_by.into(),
        }
    }

    /// Short name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Push { .. } => "push",
            Self::InfraChange { .. } => "infra_change",
            Self::Manual { .. } => "manual",
        }
    }

    /// Decides whether the event starts an execution of `tracked`.
    ///
    /// Returns the commit to deliver. `None` means the source action resolves
    /// the branch head.
    ///
    /// # Errors
    ///
    /// Returns `DeployflowError::TriggerIgnored` for infrastructure-only
    /// changes, pushes to other repositories or branches, and pushes without a
    /// commit.
    pub fn admit(&self, tracked: &SourceConfig) -> Result<Option<String>> {
        match self {
            Self::Push {
                repository,
                branch,
                commit_id,
            } => {
                if repository != &tracked.repository || branch != &tracked.branch {
                    return Err(DeployflowError::TriggerIgnored(format!(
                        "push to {repository}@{branch} is not tracked (tracking {}@{})",
                        tracked.repository, tracked.branch
                    )));
                }
                if commit_id.trim().is_empty() {
                    return Err(DeployflowError::TriggerIgnored(
                        "push carries no commit".to_string(),
                    ));
                }
                Ok(Some(commit_id.clone()))
            }
            Self::InfraChange { commit_id } => Err(DeployflowError::TriggerIgnored(format!(
                "infrastructure change {commit_id} does not start a deployment"
            ))),
            Self::Manual { .. } => Ok(None),
        }
    }
}
