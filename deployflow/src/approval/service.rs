//! Approval service: one pending request per execution, resolved exactly once.

use super::notifier::{ApprovalNotification, ApprovalNotifier, NoOpNotifier};
use crate::errors::DecisionError;
use crate::utils::{iso_timestamp, now_utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Approval request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Waiting for a decision.
    Pending,
    /// Promotion approved.
    Approved,
    /// Promotion rejected.
    Rejected,
    /// Nobody decided before the expiry.
    Expired,
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl ApprovalState {
    /// Returns true once the request can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Allow promotion.
    Approve,
    /// Block promotion.
    Reject,
}

impl Decision {
    fn resolved_state(self) -> ApprovalState {
        match self {
            Self::Approve => ApprovalState::Approved,
            Self::Reject => ApprovalState::Rejected,
        }
    }
}

/// A decision delivered for an execution's pending approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// The execution whose gate is decided.
    pub execution_id: Uuid,
    /// The verdict.
    pub decision: Decision,
    /// Optional reviewer comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Optional reviewer identity.
    #[serde(default)]
    pub actor: Option<String>,
}

impl DecisionRequest {
    /// An approval.
    #[must_use]
    pub fn approve(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            decision: Decision::Approve,
            comment: None,
            actor: None,
        }
    }

    /// A rejection.
    #[must_use]
    pub fn reject(execution_id: Uuid) -> Self {
        Self {
            decision: Decision::Reject,
            ..Self::approve(execution_id)
        }
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets the actor.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Parameters of a new approval request.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// The execution reaching the gate.
    pub execution_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Stage holding the gate.
    pub stage: String,
    /// Gate action name.
    pub action: String,
    /// Commit being promoted.
    pub commit_id: Option<String>,
    /// Message for reviewers.
    pub message: String,
    /// How long to wait before expiring. Waits indefinitely when `None`.
    pub expiry: Option<Duration>,
    /// Whether to send a notification.
    pub notify: bool,
}

/// The audit record of one approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// The execution the request belongs to.
    pub execution_id: Uuid,
    /// Stage holding the gate.
    pub stage: String,
    /// Gate action name.
    pub action: String,
    /// Commit being promoted.
    pub commit_id: Option<String>,
    /// Message for reviewers.
    pub message: String,
    /// Current state.
    pub state: ApprovalState,
    /// When the request was created (ISO 8601).
    pub requested_at: String,
    /// When the request expires, if it does.
    pub expires_at: Option<String>,
    /// When the request was resolved.
    pub resolved_at: Option<String>,
    /// Who resolved it.
    pub actor: Option<String>,
    /// Reviewer comment.
    pub comment: Option<String>,
}

struct Entry {
    record: ApprovalRecord,
    responder: Option<oneshot::Sender<ApprovalState>>,
}

/// Tracks approval requests keyed by execution id.
///
/// Resolved records stay in the service for audit.
pub struct ApprovalService {
    entries: RwLock<HashMap<Uuid, Entry>>,
    notifier: Arc<dyn ApprovalNotifier>,
}

impl Default for ApprovalService {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalService {
    /// Creates a service that sends no notifications.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            notifier: Arc::new(NoOpNotifier),
        }
    }

    /// Sets the notification channel.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Opens a request and waits until it is resolved.
    ///
    /// Returns the resolved record: approved, rejected or expired.
    ///
    /// # Errors
    ///
    /// Returns `DecisionError::AlreadyRequested` if the execution already has
    /// a request.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
    ) -> Result<ApprovalRecord, DecisionError> {
        let execution_id = request.execution_id;
        let (tx, rx) = oneshot::channel();
        // An expiry past chrono's range still waits; it just carries no stamp.
        let expires_at = request.expiry.and_then(|expiry| {
            chrono::Duration::from_std(expiry)
                .ok()
                .and_then(|expiry| now_utc().checked_add_signed(expiry))
                .map(|at| at.to_rfc3339())
        });

        let record = ApprovalRecord {
            execution_id,
            stage: request.stage.clone(),
            action: request.action.clone(),
            commit_id: request.commit_id.clone(),
            message: request.message.clone(),
            state: ApprovalState::Pending,
            requested_at: iso_timestamp(),
            expires_at,
            resolved_at: None,
            actor: None,
            comment: None,
        };

        {
            let mut entries = self.entries.write();
            if entries.contains_key(&execution_id) {
                return Err(DecisionError::AlreadyRequested { execution_id });
            }
            entries.insert(
                execution_id,
                Entry {
                    record: record.clone(),
                    responder: Some(tx),
                },
            );
        }
        info!(%execution_id, stage = %request.stage, "Approval pending");

        if request.notify {
            let notification = ApprovalNotification {
                execution_id,
                pipeline: request.pipeline,
                stage: record.stage.clone(),
                action: record.action.clone(),
                commit_id: record.commit_id.clone(),
                message: record.message.clone(),
                requested_at: record.requested_at.clone(),
                expires_at: record.expires_at.clone(),
            };
            if let Err(e) = self.notifier.notify(&notification).await {
                warn!(%execution_id, error = %e, "Approval notification failed");
            }
        }

        let resolved = match request.expiry {
            Some(expiry) => matches!(tokio::time::timeout(expiry, rx).await, Ok(Ok(_))),
            None => rx.await.is_ok(),
        };
        if !resolved {
            self.expire(execution_id);
        }

        self.get(execution_id)
            .ok_or(DecisionError::NotFound { execution_id })
    }

    /// Marks a still-pending request expired. A decision that won the race
    /// against the timer is kept.
    fn expire(&self, execution_id: Uuid) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&execution_id) {
            if entry.record.state == ApprovalState::Pending {
                entry.record.state = ApprovalState::Expired;
                entry.record.resolved_at = Some(iso_timestamp());
                entry.responder = None;
                info!(%execution_id, "Approval expired");
            } else {
                debug!(%execution_id, state = %entry.record.state, "Decision arrived at expiry");
            }
        }
    }

    /// Applies a decision.
    ///
    /// # Errors
    ///
    /// Returns `DecisionError::NotFound` when the execution has no request and
    /// `DecisionError::AlreadyResolved` when it was already decided or
    /// expired. Neither mutates any state.
    pub fn decide(&self, decision: DecisionRequest) -> Result<ApprovalRecord, DecisionError> {
        let execution_id = decision.execution_id;
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&execution_id)
            .ok_or(DecisionError::NotFound { execution_id })?;

        if entry.record.state.is_terminal() {
            return Err(DecisionError::AlreadyResolved {
                execution_id,
                state: entry.record.state,
            });
        }

        let state = decision.decision.resolved_state();
        entry.record.state = state;
        entry.record.resolved_at = Some(iso_timestamp());
        entry.record.actor = decision.actor;
        entry.record.comment = decision.comment;
        if let Some(responder) = entry.responder.take() {
            // The waiter may already be gone after a timeout; the record is
            // authoritative either way.
            let _ = responder.send(state);
        }
        info!(%execution_id, %state, actor = entry.record.actor.as_deref().unwrap_or("-"), "Approval decided");
        Ok(entry.record.clone())
    }

    /// Returns the record of an execution's request.
    #[must_use]
    pub fn get(&self, execution_id: Uuid) -> Option<ApprovalRecord> {
        self.entries
            .read()
            .get(&execution_id)
            .map(|entry| entry.record.clone())
    }

    /// Returns all pending requests.
    #[must_use]
    pub fn pending(&self) -> Vec<ApprovalRecord> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.record.state == ApprovalState::Pending)
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.record.state == ApprovalState::Pending)
            .count()
    }

    /// Returns true if the execution is waiting on a decision.
    #[must_use]
    pub fn is_pending(&self, execution_id: Uuid) -> bool {
        self.get(execution_id)
            .is_some_and(|record| record.state == ApprovalState::Pending)
    }
}

impl fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalService")
            .field("pending_count", &self.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NotifyError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn request(execution_id: Uuid, expiry: Option<Duration>) -> ApprovalRequest {
        ApprovalRequest {
            execution_id,
            pipeline: "proxy-service-pipeline".to_string(),
            stage: "Test".to_string(),
            action: "approve-promotion".to_string(),
            commit_id: Some("abc123".to_string()),
            message: "Promote?".to_string(),
            expiry,
            notify: true,
        }
    }

    async fn wait_pending(service: &ApprovalService, execution_id: Uuid) {
        while !service.is_pending(execution_id) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_approval_approved() {
        let service = Arc::new(ApprovalService::new());
        let id = Uuid::new_v4();
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.request_approval(request(id, None)).await })
        };

        wait_pending(&service, id).await;
        assert_eq!(service.pending_count(), 1);
        service
            .decide(DecisionRequest::approve(id).with_actor("alice").with_comment("lgtm"))
            .unwrap();

        let record = waiter.await.unwrap().unwrap();
        assert_eq!(record.state, ApprovalState::Approved);
        assert_eq!(record.actor.as_deref(), Some("alice"));
        assert_eq!(record.comment.as_deref(), Some("lgtm"));
        assert!(record.resolved_at.is_some());
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_approval_rejected() {
        let service = Arc::new(ApprovalService::new());
        let id = Uuid::new_v4();
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.request_approval(request(id, None)).await })
        };

        wait_pending(&service, id).await;
        service.decide(DecisionRequest::reject(id)).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap().state, ApprovalState::Rejected);
    }

    #[tokio::test]
    async fn test_second_decision_is_rejected_without_mutation() {
        let service = Arc::new(ApprovalService::new());
        let id = Uuid::new_v4();
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.request_approval(request(id, None)).await })
        };

        wait_pending(&service, id).await;
        service.decide(DecisionRequest::approve(id).with_actor("alice")).unwrap();
        let err = service
            .decide(DecisionRequest::reject(id).with_actor("mallory"))
            .unwrap_err();

        assert_eq!(
            err,
            DecisionError::AlreadyResolved {
                execution_id: id,
                state: ApprovalState::Approved
            }
        );
        let record = waiter.await.unwrap().unwrap();
        assert_eq!(record.state, ApprovalState::Approved);
        assert_eq!(record.actor.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_approval_expires() {
        let service = ApprovalService::new();
        let id = Uuid::new_v4();

        let record = service
            .request_approval(request(id, Some(Duration::from_millis(20))))
            .await
            .unwrap();

        assert_eq!(record.state, ApprovalState::Expired);
        assert!(record.expires_at.is_some());
        assert!(matches!(
            service.decide(DecisionRequest::approve(id)),
            Err(DecisionError::AlreadyResolved {
                state: ApprovalState::Expired,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_still_waits_for_decision() {
        let service = Arc::new(ApprovalService::new());
        let id = Uuid::new_v4();
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .request_approval(request(id, Some(Duration::from_secs(10_000_000_000_000))))
                    .await
            })
        };

        wait_pending(&service, id).await;
        assert!(service.get(id).unwrap().expires_at.is_none());
        service.decide(DecisionRequest::approve(id)).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap().state, ApprovalState::Approved);
    }

    #[tokio::test]
    async fn test_decide_unknown_execution() {
        let service = ApprovalService::new();
        let id = Uuid::new_v4();
        assert_eq!(
            service.decide(DecisionRequest::approve(id)),
            Err(DecisionError::NotFound { execution_id: id })
        );
    }

    #[tokio::test]
    async fn test_duplicate_request() {
        let service = Arc::new(ApprovalService::new());
        let id = Uuid::new_v4();
        let _waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.request_approval(request(id, None)).await })
        };
        wait_pending(&service, id).await;

        let err = service.request_approval(request(id, None)).await.unwrap_err();
        assert_eq!(err, DecisionError::AlreadyRequested { execution_id: id });
    }

    struct FailingNotifier {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ApprovalNotifier for FailingNotifier {
        async fn notify(&self, _notification: &ApprovalNotification) -> Result<(), NotifyError> {
            *self.calls.lock() += 1;
            Err(NotifyError("channel down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_gate() {
        let notifier = Arc::new(FailingNotifier {
            calls: Mutex::new(0),
        });
        let service = ApprovalService::new().with_notifier(notifier.clone());
        let id = Uuid::new_v4();

        let record = service
            .request_approval(request(id, Some(Duration::from_millis(10))))
            .await
            .unwrap();

        assert_eq!(*notifier.calls.lock(), 1);
        assert_eq!(record.state, ApprovalState::Expired);
    }
}
