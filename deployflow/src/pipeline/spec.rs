//! Stage and action specifications.

use crate::actions::Action;
use crate::core::ActionKind;
use crate::environment::{Environment, Milestone};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Specification for a single action in a stage.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    /// The unique name of the action.
    pub name: String,
    /// The kind of the action.
    pub kind: ActionKind,
    /// Position within the stage. Equal run orders run concurrently.
    pub run_order: u32,
    /// The action implementation.
    pub runner: Arc<dyn Action>,
    /// Artifacts the action reads.
    pub inputs: Vec<String>,
    /// Artifacts the action produces.
    pub outputs: Vec<String>,
}

impl ActionSpec {
    /// Creates a specification taking name and kind from the runner.
    #[must_use]
    pub fn new(runner: Arc<dyn Action>, run_order: u32) -> Self {
        Self {
            name: runner.name().to_string(),
            kind: runner.kind(),
            run_order,
            runner,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Sets the input artifacts.
    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output artifacts.
    #[must_use]
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the action declared `artifact` as an output.
    #[must_use]
    pub fn produces(&self, artifact: &str) -> bool {
        self.outputs.iter().any(|o| o == artifact)
    }
}

/// Specification for a stage: an environment and its actions.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// Environment the stage deploys to, if any.
    pub environment: Option<Environment>,
    /// Actions in declaration order.
    pub actions: Vec<ActionSpec>,
}

impl StageSpec {
    /// Creates an empty stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: None,
            actions: Vec::new(),
        }
    }

    /// Binds the stage to an environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    /// Actions grouped by run order, ascending. Declaration order is kept
    /// inside a group.
    #[must_use]
    pub fn run_order_groups(&self) -> Vec<(u32, Vec<&ActionSpec>)> {
        let mut groups: BTreeMap<u32, Vec<&ActionSpec>> = BTreeMap::new();
        for action in &self.actions {
            groups.entry(action.run_order).or_default().push(action);
        }
        groups.into_iter().collect()
    }

    /// The promotion milestone `action` reaches in this stage.
    #[must_use]
    pub fn milestone_for(&self, action: &ActionSpec) -> Option<Milestone> {
        Milestone::for_action(action.kind, self.environment.as_ref().map(|env| env.tier))
    }

    /// Returns the action with the given name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// The highest run order in the stage.
    #[must_use]
    pub fn max_run_order(&self) -> Option<u32> {
        self.actions.iter().map(|a| a.run_order).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentTier;
    use crate::testing::RecordingAction;

    fn action(name: &str, run_order: u32, kind: ActionKind) -> ActionSpec {
        ActionSpec::new(Arc::new(RecordingAction::new(name).with_kind(kind)), run_order)
    }

    #[test]
    fn test_run_order_groups_are_sorted() {
        let stage = StageSpec::new("Test")
            .with_action(action("approve", 99, ActionKind::Approval))
            .with_action(action("deploy", 1, ActionKind::BuildDeploy))
            .with_action(action("smoke-a", 98, ActionKind::SmokeTest))
            .with_action(action("smoke-b", 98, ActionKind::Custom));

        let groups: Vec<(u32, Vec<&str>)> = stage
            .run_order_groups()
            .into_iter()
            .map(|(order, actions)| (order, actions.iter().map(|a| a.name.as_str()).collect()))
            .collect();

        assert_eq!(
            groups,
            vec![
                (1, vec!["deploy"]),
                (98, vec!["smoke-a", "smoke-b"]),
                (99, vec!["approve"]),
            ]
        );
        assert_eq!(stage.max_run_order(), Some(99));
    }

    #[test]
    fn test_milestone_depends_on_environment() {
        let deploy = action("deploy", 1, ActionKind::BuildDeploy);
        let bare = StageSpec::new("Build").with_action(deploy.clone());
        assert_eq!(bare.milestone_for(&deploy), None);

        let prod = StageSpec::new("Prod")
            .with_environment(Environment::new("prod", EnvironmentTier::Prod, "r"))
            .with_action(deploy.clone());
        assert_eq!(
            prod.milestone_for(&deploy),
            Some(Milestone::Deployed(EnvironmentTier::Prod))
        );
    }

    #[test]
    fn test_action_spec_takes_runner_identity() {
        let spec = action("deploy", 1, ActionKind::BuildDeploy).with_outputs(["Bundle"]);
        assert_eq!(spec.name, "deploy");
        assert_eq!(spec.kind, ActionKind::BuildDeploy);
        assert!(spec.produces("Bundle"));
    }
}
