//! The built pipeline and the standard Source → Test → Prod topology.

use super::{ActionSpec, PipelineBuilder, StageSpec};
use crate::actions::{
    ApprovalAction, BuildDeployAction, DeployBackend, SmokeTestAction, SmokeTestRunner,
    SourceAction, SourceProvider,
};
use crate::approval::ApprovalService;
use crate::config::PipelineConfig;
use crate::core::{APP_CODE, INFRA_CODE};
use crate::environment::{Environment, EnvironmentTier};
use crate::errors::PipelineValidationError;
use std::sync::Arc;

/// Stage names of the standard topology.
pub mod names {
    /// Source stage.
    pub const SOURCE_STAGE: &str = "Source";
    /// Test stage.
    pub const TEST_STAGE: &str = "Test";
    /// Prod stage.
    pub const PROD_STAGE: &str = "Prod";

    /// Source fetch.
    pub const SOURCE: &str = "source";
    /// Test build-and-deploy.
    pub const TEST_DEPLOY: &str = "test-deploy";
    /// Test smoke tests.
    pub const TEST_SMOKE: &str = "test-smoke";
    /// Manual approval gate.
    pub const APPROVE_PROMOTION: &str = "approve-promotion";
    /// Prod build-and-deploy.
    pub const PROD_DEPLOY: &str = "prod-deploy";
    /// Prod smoke tests.
    pub const PROD_SMOKE: &str = "prod-smoke";
}

/// A validated pipeline: an ordered list of stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<StageSpec>,
}

impl Pipeline {
    /// Only the builder constructs pipelines, after validation.
    pub(crate) fn new(name: String, stages: Vec<StageSpec>) -> Self {
        Self { name, stages }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the stage with the given name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// All action names, in execution order.
    #[must_use]
    pub fn action_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.run_order_groups())
            .flat_map(|(_, group)| group.into_iter().map(|a| a.name.as_str()))
            .collect()
    }

    /// Returns true if the pipeline walks the promotion path.
    #[must_use]
    pub fn has_promotion_path(&self) -> bool {
        self.stages
            .iter()
            .any(|s| s.actions.iter().any(|a| s.milestone_for(a).is_some()))
    }
}

/// External systems the standard actions talk to.
#[derive(Clone)]
pub struct Collaborators {
    /// Source control.
    pub source: Arc<dyn SourceProvider>,
    /// Compute and routing.
    pub deploy: Arc<dyn DeployBackend>,
    /// Smoke-test execution.
    pub smoke: Arc<dyn SmokeTestRunner>,
    /// Approval requests and decisions.
    pub approvals: Arc<ApprovalService>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("approvals", &self.approvals)
            .finish_non_exhaustive()
    }
}

/// Builds the canonical topology:
///
/// ```text
/// Source { source(1) }
/// Test   { test-deploy(1), test-smoke(98), approve-promotion(99) }
/// Prod   { prod-deploy(1), prod-smoke(2) }
/// ```
///
/// Run orders come from `config.run_orders`.
///
/// # Errors
///
/// Returns a validation error if the configured run orders break the
/// topology rules.
pub fn standard_pipeline(
    config: &PipelineConfig,
    collaborators: &Collaborators,
) -> Result<Pipeline, PipelineValidationError> {
    let orders = config.run_orders;
    let test_env = Environment::from_config(EnvironmentTier::Test, &config.test);
    let prod_env = Environment::from_config(EnvironmentTier::Prod, &config.prod);

    let source = StageSpec::new(names::SOURCE_STAGE).with_action(
        ActionSpec::new(
            Arc::new(SourceAction::new(
                names::SOURCE,
                config.app_source.clone(),
                config.infra_source.clone(),
                Arc::clone(&collaborators.source),
            )),
            1,
        )
        .with_outputs([APP_CODE, INFRA_CODE]),
    );

    let test = StageSpec::new(names::TEST_STAGE)
        .with_environment(test_env)
        .with_action(
            ActionSpec::new(
                Arc::new(BuildDeployAction::new(names::TEST_DEPLOY, Arc::clone(&collaborators.deploy))),
                orders.deploy,
            )
            .with_inputs([APP_CODE, INFRA_CODE]),
        )
        .with_action(
            ActionSpec::new(
                Arc::new(SmokeTestAction::new(
                    names::TEST_SMOKE,
                    Arc::clone(&collaborators.smoke),
                    config.smoke.clone(),
                )),
                orders.smoke,
            )
            .with_inputs([APP_CODE]),
        )
        .with_action(ActionSpec::new(
            Arc::new(ApprovalAction::new(
                names::APPROVE_PROMOTION,
                Arc::clone(&collaborators.approvals),
                config.approval.clone(),
            )),
            orders.approval,
        ));

    let prod = StageSpec::new(names::PROD_STAGE)
        .with_environment(prod_env)
        .with_action(
            ActionSpec::new(
                Arc::new(BuildDeployAction::new(names::PROD_DEPLOY, Arc::clone(&collaborators.deploy))),
                orders.deploy,
            )
            .with_inputs([APP_CODE, INFRA_CODE]),
        )
        .with_action(
            ActionSpec::new(
                Arc::new(SmokeTestAction::new(
                    names::PROD_SMOKE,
                    Arc::clone(&collaborators.smoke),
                    config.smoke.clone(),
                )),
                orders.prod_smoke,
            )
            .with_inputs([APP_CODE]),
        );

    PipelineBuilder::new(config.name.clone())
        .stage(source)
        .stage(test)
        .stage(prod)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionKind;
    use crate::testing::{MockDeployBackend, MockSmokeTestRunner, MockSourceProvider};

    fn collaborators() -> Collaborators {
        Collaborators {
            source: Arc::new(MockSourceProvider::new()),
            deploy: Arc::new(MockDeployBackend::new()),
            smoke: Arc::new(MockSmokeTestRunner::new()),
            approvals: Arc::new(ApprovalService::new()),
        }
    }

    #[test]
    fn test_standard_topology() {
        let pipeline = standard_pipeline(&PipelineConfig::default(), &collaborators()).unwrap();

        assert_eq!(pipeline.name(), "proxy-service-pipeline");
        assert_eq!(
            pipeline.action_names(),
            vec![
                names::SOURCE,
                names::TEST_DEPLOY,
                names::TEST_SMOKE,
                names::APPROVE_PROMOTION,
                names::PROD_DEPLOY,
                names::PROD_SMOKE,
            ]
        );

        let test = pipeline.stage(names::TEST_STAGE).unwrap();
        let orders: Vec<u32> = test.actions.iter().map(|a| a.run_order).collect();
        assert_eq!(orders, vec![1, 98, 99]);
        assert_eq!(test.environment.as_ref().unwrap().role, "test-deploy-role");
        assert_eq!(test.action(names::APPROVE_PROMOTION).unwrap().kind, ActionKind::Approval);

        let prod = pipeline.stage(names::PROD_STAGE).unwrap();
        assert!(prod.environment.as_ref().unwrap().is_prod());
        assert_eq!(prod.max_run_order(), Some(2));
        assert!(pipeline.has_promotion_path());
    }

    #[test]
    fn test_gate_before_smoke_is_rejected() {
        let mut config = PipelineConfig::default();
        config.run_orders.approval = 50;

        let err = standard_pipeline(&config, &collaborators()).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-GATE_ORDER"));
    }
}
