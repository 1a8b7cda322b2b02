//! Manual approval gate: pending requests, decisions and notifications.

mod notifier;
mod service;

pub use notifier::{ApprovalNotification, ApprovalNotifier, LoggingNotifier, NoOpNotifier};
#[cfg(feature = "http")]
pub use notifier::WebhookNotifier;
pub use service::{
    ApprovalRecord, ApprovalRequest, ApprovalService, ApprovalState, Decision, DecisionRequest,
};
