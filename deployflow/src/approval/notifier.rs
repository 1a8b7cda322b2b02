//! Notification channel fanned out when an approval is requested.

use crate::errors::NotifyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// What a reviewer needs to know about a pending approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalNotification {
    /// The execution waiting on the decision.
    pub execution_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Stage holding the gate.
    pub stage: String,
    /// The gate action.
    pub action: String,
    /// Commit being promoted.
    pub commit_id: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// When the request was created (ISO 8601).
    pub requested_at: String,
    /// When the request expires, if it does.
    pub expires_at: Option<String>,
}

/// Delivers approval notifications.
///
/// Delivery is fire-and-forget: a failed notification is logged and never
/// fails the gate.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    /// Sends a notification.
    async fn notify(&self, notification: &ApprovalNotification) -> Result<(), NotifyError>;
}

/// Discards notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl ApprovalNotifier for NoOpNotifier {
    async fn notify(&self, _notification: &ApprovalNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl ApprovalNotifier for LoggingNotifier {
    async fn notify(&self, notification: &ApprovalNotification) -> Result<(), NotifyError> {
        info!(
            execution_id = %notification.execution_id,
            pipeline = %notification.pipeline,
            stage = %notification.stage,
            commit_id = notification.commit_id.as_deref().unwrap_or("-"),
            expires_at = notification.expires_at.as_deref().unwrap_or("-"),
            "Approval requested: {}", notification.message
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a chat or email webhook.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// The JSON body sent for a notification.
    #[must_use]
    pub fn payload(notification: &ApprovalNotification) -> serde_json::Value {
        let commit = notification.commit_id.as_deref().unwrap_or("unknown");
        serde_json::json!({
            "text": format!(
                "[{}] {} (commit {commit}, execution {})",
                notification.pipeline, notification.message, notification.execution_id
            ),
            "notification": notification,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ApprovalNotifier for WebhookNotifier {
    async fn notify(&self, notification: &ApprovalNotification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(notification))
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "webhook returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
