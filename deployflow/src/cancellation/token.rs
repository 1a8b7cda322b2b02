//! Cancellation tokens and the per-execution registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent; only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Returns true if this call performed the cancellation.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
            true
        } else {
            false
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Tokens of in-flight executions, keyed by execution id.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: RwLock<HashMap<Uuid, Arc<CancellationToken>>>,
}

impl CancellationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token for an execution and returns it.
    pub fn register(&self, execution_id: Uuid) -> Arc<CancellationToken> {
        let token = Arc::new(CancellationToken::new());
        self.tokens.write().insert(execution_id, Arc::clone(&token));
        token
    }

    /// Returns the token for an execution.
    #[must_use]
    pub fn get(&self, execution_id: Uuid) -> Option<Arc<CancellationToken>> {
        self.tokens.read().get(&execution_id).cloned()
    }

    /// Cancels an in-flight execution.
    ///
    /// Returns false if the execution is unknown, finished, or already cancelled.
    pub fn cancel(&self, execution_id: Uuid, reason: impl Into<String>) -> bool {
        self.get(execution_id)
            .is_some_and(|token| token.cancel(reason))
    }

    /// Drops the token of a finished execution.
    pub fn remove(&self, execution_id: Uuid) {
        self.tokens.write().remove(&execution_id);
    }

    /// Returns the number of in-flight executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// Returns true if no execution is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}
