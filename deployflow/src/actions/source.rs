//! Source action: fetches application and infrastructure source.

use super::Action;
use crate::config::SourceConfig;
use crate::context::ActionContext;
use crate::core::{keys, ActionKind, ActionOutput, Artifact, FailureKind, APP_CODE, INFRA_CODE};
use crate::errors::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A snapshot of one repository at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRevision {
    /// Repository name.
    pub repository: String,
    /// Branch the revision was taken from.
    pub branch: String,
    /// Resolved commit.
    pub commit_id: String,
    /// File contents keyed by relative path.
    #[serde(default)]
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Source control collaborator.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetches `branch` of `repository` at `commit`, or at the branch head
    /// when `commit` is `None`.
    async fn fetch(
        &self,
        repository: &str,
        branch: &str,
        commit: Option<&str>,
    ) -> Result<SourceRevision, SourceError>;
}

/// Fetches `AppCode` at the triggering commit and `InfraCode` at its branch
/// head, and publishes both as artifacts versioned with the app commit.
#[derive(Clone)]
pub struct SourceAction {
    name: String,
    app: SourceConfig,
    infra: SourceConfig,
    provider: Arc<dyn SourceProvider>,
}

impl SourceAction {
    /// Creates a source action.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        app: SourceConfig,
        infra: SourceConfig,
        provider: Arc<dyn SourceProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            app,
            infra,
            provider,
        }
    }

    fn fetch_failed(error: &SourceError) -> ActionOutput {
        warn!(error = %error, "Source fetch failed");
        ActionOutput::fail(FailureKind::SourceFetch, error.to_string())
    }
}

impl std::fmt::Debug for SourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAction")
            .field("name", &self.name)
            .field("app", &self.app)
            .field("infra", &self.infra)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for SourceAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Source
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let app = match self
            .provider
            .fetch(&self.app.repository, &self.app.branch, ctx.commit_id())
            .await
        {
            Ok(revision) => revision,
            Err(e) => return Self::fetch_failed(&e),
        };
        let infra = match self
            .provider
            .fetch(&self.infra.repository, &self.infra.branch, None)
            .await
        {
            Ok(revision) => revision,
            Err(e) => return Self::fetch_failed(&e),
        };

        info!(
            execution_id = %ctx.execution_id(),
            commit_id = %app.commit_id,
            infra_commit_id = %infra.commit_id,
            "Fetched source"
        );

        let app_code = Artifact::new(APP_CODE, &app.commit_id)
            .with_files(app.files)
            .with_metadata("repository", &app.repository)
            .with_metadata("branch", &app.branch);
        let infra_code = Artifact::new(INFRA_CODE, &app.commit_id)
            .with_files(infra.files)
            .with_metadata("repository", &infra.repository)
            .with_metadata("branch", &infra.branch)
            .with_metadata(keys::INFRA_COMMIT_ID, &infra.commit_id);

        ActionOutput::ok_value(keys::COMMIT_ID, serde_json::json!(app.commit_id))
            .with_data(keys::INFRA_COMMIT_ID, serde_json::json!(infra.commit_id))
            .with_artifact(app_code)
            .with_artifact(infra_code)
    }
}
