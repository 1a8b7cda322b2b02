//! The persisted record of one pipeline execution.

use super::{Pipeline, SourceEvent};
use crate::core::{ActionKind, ActionOutput, ActionStatus, ExecutionStatus, FailureKind, StageStatus};
use crate::environment::PromotionState;
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status of one action within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Action name.
    pub name: String,
    /// Action kind.
    pub kind: ActionKind,
    /// Run order within the stage.
    pub run_order: u32,
    /// Current status.
    pub status: ActionStatus,
    /// When the action started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// When the action finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Wall-clock duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Output data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
    /// Error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl ActionRecord {
    fn pending(name: &str, kind: ActionKind, run_order: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            run_order,
            status: ActionStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            data: BTreeMap::new(),
            error: None,
            failure_kind: None,
        }
    }

    /// Marks the action running.
    pub fn start(&mut self) {
        self.status = ActionStatus::Running;
        self.started_at = Some(iso_timestamp());
    }

    /// Records the action's output.
    pub fn finish(&mut self, output: &ActionOutput, duration_ms: f64) {
        self.status = if output.is_success() {
            ActionStatus::Succeeded
        } else {
            ActionStatus::Failed
        };
        self.finished_at = Some(iso_timestamp());
        self.duration_ms = Some(duration_ms);
        self.data = output.data.clone();
        self.error = output.error.clone();
        self.failure_kind = if output.is_success() {
            None
        } else {
            Some(output.failure_kind.unwrap_or(FailureKind::Internal))
        };
    }
}

/// Status of one stage within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Environment name, if the stage has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Current status.
    pub status: StageStatus,
    /// When the stage started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// When the stage finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Actions in declaration order.
    pub actions: Vec<ActionRecord>,
}

impl StageRecord {
    /// Returns the record of an action.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionRecord> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Returns true if any action in the stage started.
    #[must_use]
    pub fn has_started_actions(&self) -> bool {
        self.actions.iter().any(|a| a.status.has_started())
    }
}

/// Where and why an execution halted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Stage that halted.
    pub stage: String,
    /// Action that failed. `None` for cancellation between groups.
    pub action: Option<String>,
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

/// One end-to-end run of a pipeline for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    /// Execution ID.
    pub execution_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// The event that started the execution.
    pub trigger: SourceEvent,
    /// Commit being delivered. Filled in by the source action for manual
    /// triggers.
    pub commit_id: Option<String>,
    /// Overall status.
    pub status: ExecutionStatus,
    /// How far the artifact has been promoted.
    pub promotion: PromotionState,
    /// Stages in execution order.
    pub stages: Vec<StageRecord>,
    /// Why the execution halted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    /// When the execution was created.
    pub created_at: String,
    /// When the record last changed.
    pub updated_at: String,
    /// When the execution reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl PipelineExecution {
    /// Creates a running execution with every action pending.
    #[must_use]
    pub fn new(
        execution_id: Uuid,
        pipeline: &Pipeline,
        trigger: SourceEvent,
        commit_id: Option<String>,
    ) -> Self {
        let now = iso_timestamp();
        let stages = pipeline
            .stages()
            .iter()
            .map(|stage| StageRecord {
                name: stage.name.clone(),
                environment: stage.environment.as_ref().map(|env| env.name.clone()),
                status: StageStatus::Pending,
                started_at: None,
                finished_at: None,
                actions: stage
                    .actions
                    .iter()
                    .map(|a| ActionRecord::pending(&a.name, a.kind, a.run_order))
                    .collect(),
            })
            .collect();

        Self {
            execution_id,
            pipeline: pipeline.name().to_string(),
            trigger,
            commit_id,
            status: ExecutionStatus::Running,
            promotion: PromotionState::NotDeployed,
            stages,
            failure: None,
            created_at: now.clone(),
            updated_at: now,
            finished_at: None,
        }
    }

    /// Returns a stage record.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns a mutable stage record.
    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Returns an action record from any stage.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionRecord> {
        self.stages.iter().find_map(|s| s.action(name))
    }

    /// Returns a mutable action record from any stage.
    pub fn action_mut(&mut self, name: &str) -> Option<&mut ActionRecord> {
        self.stages
            .iter_mut()
            .find_map(|s| s.actions.iter_mut().find(|a| a.name == name))
    }

    /// Marks every action that has not started as skipped, and every stage
    /// that has not started as skipped.
    pub fn skip_remaining(&mut self) {
        for stage in &mut self.stages {
            for action in &mut stage.actions {
                if action.status == ActionStatus::Pending {
                    action.status = ActionStatus::Skipped;
                }
            }
            if stage.status == StageStatus::Pending {
                stage.status = StageStatus::Skipped;
            }
        }
    }

    /// Moves the execution to a terminal status.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        let now = iso_timestamp();
        self.finished_at = Some(now.clone());
        self.updated_at = now;
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = iso_timestamp();
    }

    /// Returns true once the execution can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ActionSpec, PipelineBuilder, StageSpec};
    use crate::testing::RecordingAction;
    use std::sync::Arc;

    fn pipeline() -> Pipeline {
        PipelineBuilder::new("p")
            .stage(
                StageSpec::new("Build")
                    .with_action(ActionSpec::new(Arc::new(RecordingAction::new("a")), 1))
                    .with_action(ActionSpec::new(Arc::new(RecordingAction::new("b")), 2)),
            )
            .stage(StageSpec::new("Ship").with_action(ActionSpec::new(Arc::new(RecordingAction::new("c")), 1)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_execution_is_all_pending() {
        let execution = PipelineExecution::new(Uuid::new_v4(), &pipeline(), SourceEvent::manual("ops"), None);

        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(execution.promotion, PromotionState::NotDeployed);
        assert_eq!(execution.stages.len(), 2);
        assert!(execution
            .stages
            .iter()
            .flat_map(|s| &s.actions)
            .all(|a| a.status == ActionStatus::Pending));
    }

    #[test]
    fn test_finish_and_skip_remaining() {
        let mut execution = PipelineExecution::new(Uuid::new_v4(), &pipeline(), SourceEvent::manual("ops"), None);
        execution.stage_mut("Build").unwrap().status = StageStatus::Running;
        let action = execution.action_mut("a").unwrap();
        action.start();
        action.finish(&ActionOutput::fail(FailureKind::Build, "boom"), 1.0);

        execution.skip_remaining();

        assert_eq!(execution.action("a").unwrap().failure_kind, Some(FailureKind::Build));
        assert_eq!(execution.action("b").unwrap().status, ActionStatus::Skipped);
        assert_eq!(execution.stage("Ship").unwrap().status, StageStatus::Skipped);
        assert_eq!(execution.stage("Build").unwrap().status, StageStatus::Running);
        assert!(execution.stage("Build").unwrap().has_started_actions());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let execution = PipelineExecution::new(
            Uuid::new_v4(),
            &pipeline(),
            SourceEvent::push("svc", "main", "abc123"),
            Some("abc123".to_string()),
        );
        let json = serde_json::to_string(&execution).unwrap();
        let restored: PipelineExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, execution);
    }
}
