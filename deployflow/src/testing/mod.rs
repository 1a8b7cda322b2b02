//! Testing utilities for deployflow pipelines.
//!
//! This module provides:
//! - Mock collaborators (source control, deploy backend, smoke runner, notifier)
//! - Recording and failing actions
//! - A harness around the standard pipeline
//! - Assertions for executions and outputs

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_action_skipped, assert_action_status, assert_execution_failed,
    assert_execution_succeeded, assert_output_failed, assert_output_succeeded,
    assert_promotion_state,
};
pub use fixtures::TestHarness;
pub use mocks::{
    ActionLog, ActionSpan, FailingAction, MockDeployBackend, MockSmokeTestRunner,
    MockSourceProvider, RecordingAction, RecordingNotifier,
};
