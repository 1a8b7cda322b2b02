//! Test assertions for executions and action outputs.

use crate::core::{ActionOutput, ActionStatus, ExecutionStatus, FailureKind};
use crate::environment::PromotionState;
use crate::pipeline::PipelineExecution;

/// Asserts that the execution finished successfully.
pub fn assert_execution_succeeded(execution: &PipelineExecution) {
    assert_eq!(
        execution.status,
        ExecutionStatus::Succeeded,
        "Expected success, got {} with failure {:?}",
        execution.status,
        execution.failure
    );
}

/// Asserts that the execution failed with the given failure kind.
pub fn assert_execution_failed(execution: &PipelineExecution, kind: FailureKind) {
    assert_eq!(
        execution.status,
        ExecutionStatus::Failed,
        "Expected failure, got {}",
        execution.status
    );
    let actual = execution.failure.as_ref().map(|f| f.kind);
    assert_eq!(actual, Some(kind), "Expected failure kind {kind}, got {actual:?}");
}

/// Asserts the execution's promotion state.
pub fn assert_promotion_state(execution: &PipelineExecution, expected: PromotionState) {
    assert_eq!(
        execution.promotion, expected,
        "Expected promotion state {expected}, got {}",
        execution.promotion
    );
}

/// Asserts the status of one action.
pub fn assert_action_status(execution: &PipelineExecution, action: &str, expected: ActionStatus) {
    let actual = execution.action(action).map(|a| a.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected action '{action}' to be {expected}, got {actual:?}"
    );
}

/// Asserts that an action never started.
pub fn assert_action_skipped(execution: &PipelineExecution, action: &str) {
    assert_action_status(execution, action, ActionStatus::Skipped);
}

/// Asserts that the output indicates success.
pub fn assert_output_succeeded(output: &ActionOutput) {
    assert!(
        output.is_success(),
        "Expected success, got {:?}: {:?}",
        output.failure_kind,
        output.error
    );
}

/// Asserts that the output failed with the given kind.
pub fn assert_output_failed(output: &ActionOutput, kind: FailureKind) {
    assert!(output.is_failure(), "Expected failure, got success");
    assert_eq!(output.failure_kind, Some(kind));
}
