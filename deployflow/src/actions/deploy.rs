//! Build-and-deploy action: packages the application and provisions an
//! environment tagged with the commit being delivered.

use super::Action;
use crate::context::ActionContext;
use crate::core::{keys, ActionKind, ActionOutput, Artifact, FailureKind, APP_CODE, INFRA_CODE};
use crate::environment::EnvironmentTier;
use crate::errors::DeployError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Variable carrying the commit into every build.
pub const COMMIT_ID_VARIABLE: &str = "COMMIT_ID";

/// Everything the deploy backend needs to provision one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// The execution performing the deployment.
    pub execution_id: Uuid,
    /// Target environment name.
    pub environment: String,
    /// Target environment tier.
    pub tier: EnvironmentTier,
    /// Role to assume while provisioning.
    pub role: String,
    /// Commit the deployment is tagged with.
    pub version_tag: String,
    /// Build variables, including `COMMIT_ID`.
    pub variables: BTreeMap<String, String>,
    /// Application source.
    pub app_code: Artifact,
    /// Infrastructure definitions.
    pub infra_code: Artifact,
}

/// What a successful deployment reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    /// Public endpoint of the deployed environment.
    pub endpoint: Option<String>,
    /// Backend-specific deployment identifier.
    pub deployment_id: Option<String>,
}

/// Compute and routing collaborator.
#[async_trait]
pub trait DeployBackend: Send + Sync {
    /// Builds the application and provisions the environment.
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployReceipt, DeployError>;
}

/// Deploys `AppCode` + `InfraCode` to the stage's environment.
#[derive(Clone)]
pub struct BuildDeployAction {
    name: String,
    backend: Arc<dyn DeployBackend>,
}

impl BuildDeployAction {
    /// Creates a build-and-deploy action.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: Arc<dyn DeployBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    async fn input(ctx: &ActionContext, name: &str) -> Result<Artifact, ActionOutput> {
        ctx.artifact(name)
            .await
            .map_err(|e| ActionOutput::fail(FailureKind::Artifact, e.to_string()))
    }
}

impl std::fmt::Debug for BuildDeployAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDeployAction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for BuildDeployAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::BuildDeploy
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let Some(environment) = ctx.environment() else {
            return ActionOutput::fail(
                FailureKind::Internal,
                format!("stage '{}' has no environment to deploy to", ctx.stage()),
            );
        };
        let Some(commit_id) = ctx.commit_id() else {
            return ActionOutput::fail(FailureKind::Internal, "no commit to tag the deployment with");
        };
        let app_code = match Self::input(ctx, APP_CODE).await {
            Ok(artifact) => artifact,
            Err(output) => return output,
        };
        let infra_code = match Self::input(ctx, INFRA_CODE).await {
            Ok(artifact) => artifact,
            Err(output) => return output,
        };

        let mut variables = environment.variables.clone();
        variables.insert(COMMIT_ID_VARIABLE.to_string(), commit_id.to_string());

        let request = DeployRequest {
            execution_id: ctx.execution_id(),
            environment: environment.name.clone(),
            tier: environment.tier,
            role: environment.role.clone(),
            version_tag: commit_id.to_string(),
            variables,
            app_code,
            infra_code,
        };

        match self.backend.deploy(&request).await {
            Ok(receipt) => {
                info!(
                    execution_id = %ctx.execution_id(),
                    environment = %request.environment,
                    version_tag = %request.version_tag,
                    endpoint = receipt.endpoint.as_deref().unwrap_or("-"),
                    "Deployed"
                );
                let mut output = ActionOutput::ok_value(keys::VERSION_TAG, serde_json::json!(commit_id))
                    .with_data(keys::ENVIRONMENT, serde_json::json!(request.environment))
                    .with_data(keys::ROLE, serde_json::json!(request.role));
                if let Some(endpoint) = receipt.endpoint {
                    output = output.with_data(keys::ENDPOINT, serde_json::json!(endpoint));
                }
                if let Some(deployment_id) = receipt.deployment_id {
                    output = output.with_data("deployment_id", serde_json::json!(deployment_id));
                }
                output
            }
            Err(e) => {
                warn!(
                    execution_id = %ctx.execution_id(),
                    environment = %request.environment,
                    error = %e,
                    "Deployment failed"
                );
                let kind = match e {
                    DeployError::Build(_) => FailureKind::Build,
                    DeployError::Provisioning(_) => FailureKind::Provisioning,
                };
                ActionOutput::fail(kind, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
    use crate::context::ExecutionIdentity;
    use crate::environment::Environment;
    use crate::testing::MockDeployBackend;

    async fn ctx(store: Arc<InMemoryArtifactStore>) -> ActionContext {
        let identity = ExecutionIdentity::new("p").with_commit("abc123");
        store
            .publish(identity.execution_id, "source", Artifact::new(APP_CODE, "abc123"))
            .await
            .unwrap();
        store
            .publish(identity.execution_id, "source", Artifact::new(INFRA_CODE, "abc123"))
            .await
            .unwrap();
        ActionContext::new(identity, "Test", "test-deploy")
            .with_environment(Some(
                Environment::new("test", EnvironmentTier::Test, "test-role").with_variable("LOG_LEVEL", "debug"),
            ))
            .with_declared_inputs([APP_CODE, INFRA_CODE])
            .with_artifact_store(store)
    }

    #[tokio::test]
    async fn test_deploy_injects_commit_and_role() {
        let backend = Arc::new(MockDeployBackend::new());
        let action = BuildDeployAction::new("test-deploy", backend.clone());

        let output = action.execute(&ctx(Arc::new(InMemoryArtifactStore::new())).await).await;

        assert!(output.is_success());
        assert_eq!(output.get_str(keys::VERSION_TAG), Some("abc123"));
        assert_eq!(output.get_str(keys::ENDPOINT), Some("https://test.example.internal"));

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].role, "test-role");
        assert_eq!(requests[0].version_tag, "abc123");
        assert_eq!(requests[0].variables.get("COMMIT_ID"), Some(&"abc123".to_string()));
        assert_eq!(requests[0].variables.get("LOG_LEVEL"), Some(&"debug".to_string()));
    }

    #[tokio::test]
    async fn test_build_and_provisioning_failures_are_distinct() {
        let backend = Arc::new(MockDeployBackend::new().failing_build("test", "syntax error"));
        let output = BuildDeployAction::new("test-deploy", backend)
            .execute(&ctx(Arc::new(InMemoryArtifactStore::new())).await)
            .await;
        assert_eq!(output.failure_kind, Some(FailureKind::Build));

        let backend = Arc::new(MockDeployBackend::new().failing_provisioning("test", "quota"));
        let output = BuildDeployAction::new("test-deploy", backend)
            .execute(&ctx(Arc::new(InMemoryArtifactStore::new())).await)
            .await;
        assert_eq!(output.failure_kind, Some(FailureKind::Provisioning));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails() {
        let backend = Arc::new(MockDeployBackend::new());
        let ctx = ActionContext::new(ExecutionIdentity::new("p").with_commit("abc123"), "Test", "test-deploy")
            .with_environment(Some(Environment::new("test", EnvironmentTier::Test, "r")))
            .with_declared_inputs([APP_CODE, INFRA_CODE]);

        let output = BuildDeployAction::new("test-deploy", backend.clone()).execute(&ctx).await;
        assert_eq!(output.failure_kind, Some(FailureKind::Artifact));
        assert!(backend.requests().is_empty());
    }
}
