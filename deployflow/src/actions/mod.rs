//! Action trait and implementations.
//!
//! Actions are the units of work inside a stage: fetching source, building
//! and deploying, smoke testing, and waiting for approval.

mod deploy;
mod gate;
mod smoke;
mod source;

pub use deploy::{BuildDeployAction, DeployBackend, DeployReceipt, DeployRequest};
pub use gate::ApprovalAction;
#[cfg(feature = "http")]
pub use smoke::HttpSmokeTestRunner;
pub use smoke::{CheckResult, SmokeReport, SmokeTestAction, SmokeTestRequest, SmokeTestRunner};
pub use source::{SourceAction, SourceProvider, SourceRevision};

use crate::context::ActionContext;
use crate::core::{ActionKind, ActionOutput};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for pipeline actions.
///
/// An action never returns an error: failures are reported through
/// [`ActionOutput::fail`] with a [`FailureKind`](crate::core::FailureKind).
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Returns the name of the action.
    fn name(&self) -> &str;

    /// Returns the kind of work the action performs.
    ///
    /// Deploy, smoke-test and approval kinds advance the promotion state when
    /// they succeed.
    fn kind(&self) -> ActionKind {
        ActionKind::Custom
    }

    /// Executes the action.
    async fn execute(&self, ctx: &ActionContext) -> ActionOutput;
}

/// A simple function-based action.
pub struct FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    name: String,
    kind: ActionKind,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    /// Creates a new function-based action of kind [`ActionKind::Custom`].
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Custom,
            func,
        }
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> Debug for FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        (self.func)(ctx)
    }
}

/// An async function-based action.
pub struct AsyncFnAction<F, Fut>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionOutput> + Send,
{
    name: String,
    kind: ActionKind,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnAction<F, Fut>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionOutput> + Send,
{
    /// Creates a new async function-based action of kind [`ActionKind::Custom`].
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            kind: ActionKind::Custom,
            func,
            _phantom: PhantomData,
        }
    }

    /// Sets the kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F, Fut> Debug for AsyncFnAction<F, Fut>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionOutput> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnAction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Action for AsyncFnAction<F, Fut>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = ActionOutput> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        (self.func)(ctx.clone()).await
    }
}
