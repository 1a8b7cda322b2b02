//! Read-only view of outputs produced earlier in the execution.

use std::collections::BTreeMap;

/// Data of one completed action.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorOutput {
    /// Stage the action belongs to.
    pub stage: String,
    /// Action name.
    pub action: String,
    /// The action's output data.
    pub data: BTreeMap<String, serde_json::Value>,
}

/// Outputs of every action that succeeded before the current run-order group,
/// in completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionInputs {
    outputs: Vec<PriorOutput>,
    stage: String,
}

impl ActionInputs {
    /// Creates inputs for an action of `stage`.
    #[must_use]
    pub fn new(stage: impl Into<String>, outputs: Vec<PriorOutput>) -> Self {
        Self {
            outputs,
            stage: stage.into(),
        }
    }

    /// Output data of a named action.
    #[must_use]
    pub fn get(&self, action: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.outputs
            .iter()
            .find(|output| output.action == action)
            .map(|output| &output.data)
    }

    /// A value from a named action's output.
    #[must_use]
    pub fn get_value(&self, action: &str, key: &str) -> Option<&serde_json::Value> {
        self.get(action).and_then(|data| data.get(key))
    }

    /// The most recent value for `key` produced in the current stage.
    #[must_use]
    pub fn stage_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs
            .iter()
            .rev()
            .filter(|output| output.stage == self.stage)
            .find_map(|output| output.data.get(key))
    }

    /// The most recent value for `key` produced anywhere in the execution.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs
            .iter()
            .rev()
            .find_map(|output| output.data.get(key))
    }

    /// Number of prior outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns true if nothing ran before.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(stage: &str, action: &str, key: &str, value: serde_json::Value) -> PriorOutput {
        PriorOutput {
            stage: stage.to_string(),
            action: action.to_string(),
            data: BTreeMap::from([(key.to_string(), value)]),
        }
    }

    #[test]
    fn test_stage_value_ignores_other_stages() {
        let inputs = ActionInputs::new(
            "Prod",
            vec![
                output("Test", "test-deploy", "endpoint", json!("https://test")),
                output("Prod", "prod-deploy", "endpoint", json!("https://prod")),
            ],
        );
        assert_eq!(inputs.stage_value("endpoint"), Some(&json!("https://prod")));
        assert_eq!(inputs.get_value("test-deploy", "endpoint"), Some(&json!("https://test")));

        let inputs = ActionInputs::new(
            "Prod",
            vec![output("Test", "test-deploy", "endpoint", json!("https://test"))],
        );
        assert_eq!(inputs.stage_value("endpoint"), None);
        assert_eq!(inputs.value("endpoint"), Some(&json!("https://test")));
    }

    #[test]
    fn test_latest_value_wins() {
        let inputs = ActionInputs::new(
            "Test",
            vec![
                output("Test", "a", "k", json!(1)),
                output("Test", "b", "k", json!(2)),
            ],
        );
        assert_eq!(inputs.value("k"), Some(&json!(2)));
        assert_eq!(inputs.len(), 2);
    }
}
