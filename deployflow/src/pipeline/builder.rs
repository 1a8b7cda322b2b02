//! Pipeline builder with validation.

use super::{ActionSpec, Pipeline, StageSpec};
use crate::core::ActionKind;
use crate::environment::{Milestone, PromotionState};
use crate::errors::PipelineValidationError;
use std::collections::{HashMap, HashSet};

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The stage specifications, in execution order.
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a stage in place.
    pub fn add_stage(&mut self, stage: StageSpec) {
        self.stages.push(stage);
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the topology and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, tagged with a `PIPELINE-*` code.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::with_code(
                "PIPELINE-EMPTY",
                "Pipeline has no stages",
            ));
        }

        self.check_names()?;
        for stage in &self.stages {
            check_stage_shape(stage)?;
        }
        self.check_artifact_flow()?;
        self.check_promotion_path()?;

        Ok(Pipeline::new(self.name, self.stages))
    }

    fn check_names(&self) -> Result<(), PipelineValidationError> {
        let mut stage_names = HashSet::new();
        let mut action_names = HashSet::new();

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(PipelineValidationError::with_code(
                    "PIPELINE-DUPLICATE",
                    format!("Duplicate stage name '{}'", stage.name),
                )
                .with_stages(vec![stage.name.clone()]));
            }
            for action in &stage.actions {
                if !action_names.insert(action.name.as_str()) {
                    return Err(PipelineValidationError::with_code(
                        "PIPELINE-DUPLICATE",
                        format!("Duplicate action name '{}'", action.name),
                    )
                    .with_stages(vec![stage.name.clone()]));
                }
            }
        }
        Ok(())
    }

    /// Every artifact has one producer, and every input is produced by an
    /// earlier stage or a lower run order of the same stage.
    fn check_artifact_flow(&self) -> Result<(), PipelineValidationError> {
        let mut producers: HashMap<&str, &str> = HashMap::new();
        for stage in &self.stages {
            for action in &stage.actions {
                for output in &action.outputs {
                    if let Some(existing) = producers.insert(output.as_str(), action.name.as_str()) {
                        return Err(PipelineValidationError::with_code(
                            "PIPELINE-DUPLICATE_OUTPUT",
                            format!(
                                "Artifact '{output}' is produced by both '{existing}' and '{}'",
                                action.name
                            ),
                        )
                        .with_stages(vec![stage.name.clone()]));
                    }
                }
            }
        }

        let mut available: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            for (_, group) in stage.run_order_groups() {
                for action in &group {
                    for input in &action.inputs {
                        if !available.contains(input.as_str()) {
                            return Err(PipelineValidationError::with_code(
                                "PIPELINE-MISSING_INPUT",
                                format!(
                                    "Action '{}' reads artifact '{input}' before anything produces it",
                                    action.name
                                ),
                            )
                            .with_stages(vec![stage.name.clone()]));
                        }
                    }
                }
                available.extend(
                    group
                        .iter()
                        .copied()
                        .flat_map(|a| a.outputs.iter().map(String::as_str)),
                );
            }
        }
        Ok(())
    }

    /// Milestone-bearing actions, in execution order, must walk the whole
    /// promotion path one step per run-order group.
    fn check_promotion_path(&self) -> Result<(), PipelineValidationError> {
        let mut milestones: Vec<(Milestone, &str, &str)> = Vec::new();
        for stage in &self.stages {
            for (run_order, group) in stage.run_order_groups() {
                let in_group: Vec<(Milestone, &ActionSpec)> = group
                    .iter()
                    .filter_map(|a| stage.milestone_for(a).map(|m| (m, *a)))
                    .collect();
                if in_group.len() > 1 {
                    return Err(PipelineValidationError::with_code(
                        "PIPELINE-PROMOTION_PATH",
                        format!(
                            "Run order {run_order} of stage '{}' holds {} promotion steps; only one may run at a time",
                            stage.name,
                            in_group.len()
                        ),
                    )
                    .with_stages(vec![stage.name.clone()]));
                }
                milestones.extend(
                    in_group
                        .into_iter()
                        .map(|(m, a)| (m, stage.name.as_str(), a.name.as_str())),
                );
            }
        }

        if milestones.is_empty() {
            return Ok(());
        }

        let mut state = PromotionState::NotDeployed;
        for (milestone, stage, action) in &milestones {
            state = state.advance(*milestone).map_err(|e| {
                PipelineValidationError::with_code(
                    "PIPELINE-PROMOTION_PATH",
                    format!("Action '{action}' in stage '{stage}' is out of promotion order: {e}"),
                )
                .with_stages(vec![(*stage).to_string()])
            })?;
        }
        if !state.is_terminal() {
            let missing = state
                .next_milestone()
                .map_or_else(String::new, |m| m.to_string());
            return Err(PipelineValidationError::with_code(
                "PIPELINE-PROMOTION_PATH",
                format!("Promotion path stops at {state}; missing {missing}"),
            ));
        }
        Ok(())
    }
}

fn check_stage_shape(stage: &StageSpec) -> Result<(), PipelineValidationError> {
    let stages = || vec![stage.name.clone()];

    if stage.actions.is_empty() {
        return Err(PipelineValidationError::with_code(
            "PIPELINE-EMPTY_STAGE",
            format!("Stage '{}' has no actions", stage.name),
        )
        .with_stages(stages()));
    }

    for action in &stage.actions {
        if action.run_order == 0 {
            return Err(PipelineValidationError::with_code(
                "PIPELINE-RUN_ORDER",
                format!("Action '{}' has run order 0", action.name),
            )
            .with_stages(stages()));
        }
        if matches!(action.kind, ActionKind::BuildDeploy | ActionKind::SmokeTest)
            && stage.environment.is_none()
        {
            return Err(PipelineValidationError::with_code(
                "PIPELINE-ENVIRONMENT",
                format!(
                    "Action '{}' ({}) needs an environment but stage '{}' has none",
                    action.name, action.kind, stage.name
                ),
            )
            .with_stages(stages()));
        }
    }

    for gate in stage.actions.iter().filter(|a| a.kind == ActionKind::Approval) {
        let shares_or_precedes = stage
            .actions
            .iter()
            .any(|other| other.name != gate.name && other.run_order >= gate.run_order);
        if shares_or_precedes {
            return Err(PipelineValidationError::with_code(
                "PIPELINE-GATE_ORDER",
                format!(
                    "Approval '{}' must be alone at the highest run order of stage '{}'",
                    gate.name, stage.name
                ),
            )
            .with_stages(stages()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{APP_CODE, INFRA_CODE};
    use crate::environment::{Environment, EnvironmentTier};
    use crate::testing::RecordingAction;
    use std::sync::Arc;

    fn action(name: &str, run_order: u32, kind: ActionKind) -> ActionSpec {
        ActionSpec::new(Arc::new(RecordingAction::new(name).with_kind(kind)), run_order)
    }

    fn test_env() -> Environment {
        Environment::new("test", EnvironmentTier::Test, "test-role")
    }

    fn prod_env() -> Environment {
        Environment::new("prod", EnvironmentTier::Prod, "prod-role")
    }

    fn source_stage() -> StageSpec {
        StageSpec::new("Source").with_action(
            action("source", 1, ActionKind::Source).with_outputs([APP_CODE, INFRA_CODE]),
        )
    }

    fn test_stage() -> StageSpec {
        StageSpec::new("Test")
            .with_environment(test_env())
            .with_action(action("test-deploy", 1, ActionKind::BuildDeploy).with_inputs([APP_CODE, INFRA_CODE]))
            .with_action(action("test-smoke", 98, ActionKind::SmokeTest).with_inputs([APP_CODE]))
            .with_action(action("approve", 99, ActionKind::Approval))
    }

    fn prod_stage() -> StageSpec {
        StageSpec::new("Prod")
            .with_environment(prod_env())
            .with_action(action("prod-deploy", 1, ActionKind::BuildDeploy).with_inputs([APP_CODE, INFRA_CODE]))
            .with_action(action("prod-smoke", 2, ActionKind::SmokeTest))
    }

    fn code(result: Result<Pipeline, PipelineValidationError>) -> String {
        result.unwrap_err().code().unwrap_or_default().to_string()
    }

    #[test]
    fn test_full_topology_builds() {
        let pipeline = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(test_stage())
            .stage(prod_stage())
            .build()
            .unwrap();
        assert_eq!(pipeline.stages().len(), 3);
        assert!(pipeline.has_promotion_path());
    }

    #[test]
    fn test_empty_pipeline() {
        assert_eq!(code(PipelineBuilder::new("p").build()), "PIPELINE-EMPTY");
    }

    #[test]
    fn test_empty_stage() {
        let result = PipelineBuilder::new("p").stage(StageSpec::new("Nothing")).build();
        assert_eq!(code(result), "PIPELINE-EMPTY_STAGE");
    }

    #[test]
    fn test_duplicate_names() {
        let result = PipelineBuilder::new("p").stage(source_stage()).stage(source_stage()).build();
        assert_eq!(code(result), "PIPELINE-DUPLICATE");

        let result = PipelineBuilder::new("p")
            .stage(
                StageSpec::new("Build")
                    .with_action(action("a", 1, ActionKind::Custom))
                    .with_action(action("a", 2, ActionKind::Custom)),
            )
            .build();
        assert_eq!(code(result), "PIPELINE-DUPLICATE");
    }

    #[test]
    fn test_zero_run_order() {
        let result = PipelineBuilder::new("p")
            .stage(StageSpec::new("Build").with_action(action("a", 0, ActionKind::Custom)))
            .build();
        assert_eq!(code(result), "PIPELINE-RUN_ORDER");
    }

    #[test]
    fn test_gate_must_be_alone_and_last() {
        let shared = StageSpec::new("Test")
            .with_environment(test_env())
            .with_action(action("approve", 99, ActionKind::Approval))
            .with_action(action("lint", 99, ActionKind::Custom));
        assert_eq!(code(PipelineBuilder::new("p").stage(shared).build()), "PIPELINE-GATE_ORDER");

        let early = StageSpec::new("Test")
            .with_environment(test_env())
            .with_action(action("approve", 50, ActionKind::Approval))
            .with_action(action("test-smoke", 98, ActionKind::SmokeTest));
        assert_eq!(code(PipelineBuilder::new("p").stage(early).build()), "PIPELINE-GATE_ORDER");
    }

    #[test]
    fn test_deploy_needs_environment() {
        let result = PipelineBuilder::new("p")
            .stage(StageSpec::new("Test").with_action(action("deploy", 1, ActionKind::BuildDeploy)))
            .build();
        assert_eq!(code(result), "PIPELINE-ENVIRONMENT");
    }

    #[test]
    fn test_input_must_be_produced_earlier() {
        let same_group = StageSpec::new("Build")
            .with_action(action("producer", 1, ActionKind::Custom).with_outputs(["Bundle"]))
            .with_action(action("consumer", 1, ActionKind::Custom).with_inputs(["Bundle"]));
        assert_eq!(code(PipelineBuilder::new("p").stage(same_group).build()), "PIPELINE-MISSING_INPUT");

        let later_group = StageSpec::new("Build")
            .with_action(action("producer", 1, ActionKind::Custom).with_outputs(["Bundle"]))
            .with_action(action("consumer", 2, ActionKind::Custom).with_inputs(["Bundle"]));
        assert!(PipelineBuilder::new("p").stage(later_group).build().is_ok());
    }

    #[test]
    fn test_single_producer_per_artifact() {
        let result = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(
                StageSpec::new("Build")
                    .with_action(action("rebuild", 1, ActionKind::Custom).with_outputs([APP_CODE])),
            )
            .build();
        assert_eq!(code(result), "PIPELINE-DUPLICATE_OUTPUT");
    }

    #[test]
    fn test_prod_before_approval_is_rejected() {
        let result = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(prod_stage())
            .stage(test_stage())
            .build();
        assert_eq!(code(result), "PIPELINE-PROMOTION_PATH");
    }

    #[test]
    fn test_incomplete_path_is_rejected() {
        let result = PipelineBuilder::new("p").stage(source_stage()).stage(test_stage()).build();
        let err = result.unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-PROMOTION_PATH"));
        assert!(err.message.contains("missing deployed(prod)"));
    }

    #[test]
    fn test_parallel_promotion_steps_are_rejected() {
        let parallel = StageSpec::new("Test")
            .with_environment(test_env())
            .with_action(action("deploy", 1, ActionKind::BuildDeploy))
            .with_action(action("smoke", 1, ActionKind::SmokeTest));
        assert_eq!(code(PipelineBuilder::new("p").stage(parallel).build()), "PIPELINE-PROMOTION_PATH");
    }

    #[test]
    fn test_pipeline_without_milestones_is_allowed() {
        let pipeline = PipelineBuilder::new("p")
            .stage(
                StageSpec::new("Build")
                    .with_action(action("a", 1, ActionKind::Custom))
                    .with_action(action("b", 1, ActionKind::Custom)),
            )
            .build()
            .unwrap();
        assert!(!pipeline.has_promotion_path());
    }
}
