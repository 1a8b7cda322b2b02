//! Execution identity shared by every action of one run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    /// The unique ID of the execution.
    pub execution_id: Uuid,

    /// The pipeline name.
    pub pipeline: String,

    /// The commit being delivered. Unknown until the source action resolves
    /// it for manual triggers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

impl ExecutionIdentity {
    /// Creates an identity with a generated execution ID.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            commit_id: None,
        }
    }

    /// Sets the commit.
    #[must_use]
    pub fn with_commit(mut self, commit_id: impl Into<String>) -> Self {
        self.commit_id = Some(commit_id.into());
        self
    }

    /// Sets the execution ID.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = execution_id;
        self
    }
}
