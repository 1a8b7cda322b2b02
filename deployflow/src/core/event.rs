//! Pipeline events emitted at execution, stage and action boundaries.

use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// An event describing a pipeline state change.
///
/// Events are fire-and-forget: sinks consume them for logging, monitoring or
/// notifications but never influence sequencing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "stage.started").
    #[serde(rename = "type")]
    pub event_type: String,

    /// The execution the event belongs to.
    pub execution_id: Uuid,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>, execution_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            execution_id,
            timestamp: iso_timestamp(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns a string data field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Creates an "execution.started" event.
    #[must_use]
    pub fn execution_started(execution_id: Uuid, pipeline: &str, commit_id: Option<&str>) -> Self {
        Self::new("execution.started", execution_id)
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("commit_id", serde_json::json!(commit_id))
    }

    /// Creates an "execution.succeeded" event.
    #[must_use]
    pub fn execution_succeeded(execution_id: Uuid, duration_ms: f64) -> Self {
        Self::new("execution.succeeded", execution_id)
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates an "execution.failed" event.
    #[must_use]
    pub fn execution_failed(execution_id: Uuid, stage: &str, action: Option<&str>, error: &str) -> Self {
        Self::new("execution.failed", execution_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("error", serde_json::json!(error))
    }

    /// Creates an "execution.cancelled" event.
    #[must_use]
    pub fn execution_cancelled(execution_id: Uuid, reason: &str) -> Self {
        Self::new("execution.cancelled", execution_id).add_data("reason", serde_json::json!(reason))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(execution_id: Uuid, stage: &str) -> Self {
        Self::new("stage.started", execution_id).add_data("stage", serde_json::json!(stage))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn stage_completed(execution_id: Uuid, stage: &str) -> Self {
        Self::new("stage.completed", execution_id).add_data("stage", serde_json::json!(stage))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(execution_id: Uuid, stage: &str, error: &str) -> Self {
        Self::new("stage.failed", execution_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("error", serde_json::json!(error))
    }

    /// Creates an "action.started" event.
    #[must_use]
    pub fn action_started(execution_id: Uuid, stage: &str, action: &str, run_order: u32) -> Self {
        Self::new("action.started", execution_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("run_order", serde_json::json!(run_order))
    }

    /// Creates an "action.succeeded" event.
    #[must_use]
    pub fn action_succeeded(execution_id: Uuid, stage: &str, action: &str, duration_ms: f64) -> Self {
        Self::new("action.succeeded", execution_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates an "action.failed" event.
    #[must_use]
    pub fn action_failed(execution_id: Uuid, stage: &str, action: &str, kind: &str, error: &str) -> Self {
        Self::new("action.failed", execution_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
            .add_data("failure_kind", serde_json::json!(kind))
            .add_data("error", serde_json::json!(error))
    }

    /// Creates an "approval.pending" event.
    #[must_use]
    pub fn approval_pending(execution_id: Uuid, stage: &str, action: &str) -> Self {
        Self::new("approval.pending", execution_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
    }

    /// Creates an "approval.resolved" event.
    #[must_use]
    pub fn approval_resolved(execution_id: Uuid, state: &str, actor: Option<&str>) -> Self {
        Self::new("approval.resolved", execution_id)
            .add_data("state", serde_json::json!(state))
            .add_data("actor", serde_json::json!(actor))
    }

    /// Creates a "promotion.advanced" event.
    #[must_use]
    pub fn promotion_advanced(execution_id: Uuid, from: &str, to: &str) -> Self {
        Self::new("promotion.advanced", execution_id)
            .add_data("from", serde_json::json!(from))
            .add_data("to", serde_json::json!(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let id = Uuid::new_v4();
        let event = PipelineEvent::new("test.event", id);
        assert_eq!(event.event_type, "test.event");
        assert_eq!(event.execution_id, id);
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_action_started() {
        let event = PipelineEvent::action_started(Uuid::new_v4(), "Test", "test-smoke", 98);
        assert_eq!(event.event_type, "action.started");
        assert_eq!(event.get_str("action"), Some("test-smoke"));
        assert_eq!(event.data.get("run_order"), Some(&serde_json::json!(98)));
    }

    #[test]
    fn test_execution_failed_without_action() {
        let event = PipelineEvent::execution_failed(Uuid::new_v4(), "Prod", None, "cancelled");
        assert_eq!(event.data.get("action"), Some(&serde_json::Value::Null));
        assert_eq!(event.get_str("stage"), Some("Prod"));
    }

    #[test]
    fn test_event_serialization_uses_type_key() {
        let event = PipelineEvent::stage_started(Uuid::new_v4(), "Source");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage.started");
    }
}
