//! Approval gate action.

use super::Action;
use crate::approval::{ApprovalRequest, ApprovalService, ApprovalState};
use crate::config::ApprovalConfig;
use crate::context::ActionContext;
use crate::core::{ActionKind, ActionOutput, FailureKind, PipelineEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Suspends the stage until a human approves or rejects promotion.
#[derive(Clone)]
pub struct ApprovalAction {
    name: String,
    service: Arc<ApprovalService>,
    config: ApprovalConfig,
}

impl ApprovalAction {
    /// Creates an approval gate.
    #[must_use]
    pub fn new(name: impl Into<String>, service: Arc<ApprovalService>, config: ApprovalConfig) -> Self {
        Self {
            name: name.into(),
            service,
            config,
        }
    }
}

impl std::fmt::Debug for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalAction")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for ApprovalAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Approval
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let execution_id = ctx.execution_id();
        ctx.emit(PipelineEvent::approval_pending(execution_id, ctx.stage(), ctx.action()))
            .await;

        let request = ApprovalRequest {
            execution_id,
            pipeline: ctx.pipeline().to_string(),
            stage: ctx.stage().to_string(),
            action: ctx.action().to_string(),
            commit_id: ctx.commit_id().map(str::to_string),
            message: self.config.message.clone(),
            expiry: self.config.expiry_seconds.map(Duration::from_secs),
            notify: self.config.notify,
        };
        let record = match self.service.request_approval(request).await {
            Ok(record) => record,
            Err(e) => return ActionOutput::fail(FailureKind::Internal, e.to_string()),
        };

        ctx.emit(PipelineEvent::approval_resolved(
            execution_id,
            &record.state.to_string(),
            record.actor.as_deref(),
        ))
        .await;

        let output = match record.state {
            ApprovalState::Approved => ActionOutput::ok(),
            ApprovalState::Rejected => {
                let reason = record.comment.as_deref().unwrap_or("no comment");
                ActionOutput::fail(
                    FailureKind::ApprovalRejected,
                    format!("promotion rejected: {reason}"),
                )
            }
            ApprovalState::Expired => {
                ActionOutput::fail(FailureKind::ApprovalExpired, "approval expired before a decision")
            }
            ApprovalState::Pending => {
                ActionOutput::fail(FailureKind::Internal, "approval returned while still pending")
            }
        };
        output
            .with_data("approval_state", serde_json::json!(record.state))
            .with_data("actor", serde_json::json!(record.actor))
            .with_data("comment", serde_json::json!(record.comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::DecisionRequest;
    use crate::context::ExecutionIdentity;
    use crate::events::CollectingEventSink;

    fn ctx(sink: Arc<CollectingEventSink>) -> ActionContext {
        ActionContext::new(ExecutionIdentity::new("p").with_commit("abc123"), "Test", "approve-promotion")
            .with_event_sink(sink)
    }

    #[tokio::test]
    async fn test_rejection_fails_with_comment() {
        let service = Arc::new(ApprovalService::new());
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = ctx(sink.clone());
        let id = ctx.execution_id();
        let action = ApprovalAction::new("approve-promotion", service.clone(), ApprovalConfig::default());

        let gate = tokio::spawn(async move { action.execute(&ctx).await });
        while !service.is_pending(id) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        service
            .decide(DecisionRequest::reject(id).with_comment("latency regression"))
            .unwrap();

        let output = gate.await.unwrap();
        assert_eq!(output.failure_kind, Some(FailureKind::ApprovalRejected));
        assert!(output.error.unwrap().contains("latency regression"));
        assert_eq!(sink.event_types(), vec!["approval.pending", "approval.resolved"]);
        assert_eq!(sink.events()[1].get_str("state"), Some("rejected"));
    }

    #[tokio::test]
    async fn test_expiry_fails() {
        let service = Arc::new(ApprovalService::new());
        let config = ApprovalConfig {
            expiry_seconds: Some(0),
            ..ApprovalConfig::default()
        };
        let action = ApprovalAction::new("approve-promotion", service, config);

        let output = action.execute(&ctx(Arc::new(CollectingEventSink::new()))).await;
        assert_eq!(output.failure_kind, Some(FailureKind::ApprovalExpired));
        assert_eq!(output.get_str("approval_state"), Some("expired"));
    }
}
