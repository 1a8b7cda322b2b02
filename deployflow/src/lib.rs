//! # Deployflow
//!
//! Staged deployment pipelines with gated environment promotion.
//!
//! A pipeline is an ordered list of stages. Each stage holds actions grouped by
//! run order, optionally bound to an environment. The standard topology is:
//!
//! - **Source**: fetches the application at the triggering commit and the
//!   infrastructure definitions at their branch head
//! - **Test**: deploys, smoke-tests, then waits for a human to approve
//!   promotion
//! - **Prod**: deploys the same artifacts and smoke-tests them again
//!
//! Every execution walks the promotion state machine
//! `NotDeployed → TestDeployed → TestVerified → Approved → ProdDeployed →
//! ProdVerified` one action at a time, and halts on the first failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let orchestrator = Arc::new(Orchestrator::from_config(&config, &collaborators)?);
//! let handle = orchestrator
//!     .start(SourceEvent::push("proxy-service", "main", "abc123"))
//!     .await?;
//!
//! // Later, from a reviewer:
//! orchestrator.decide(DecisionRequest::approve(handle.execution_id).with_actor("alice"))?;
//!
//! let execution = handle.wait().await?;
//! assert_eq!(execution.promotion, PromotionState::ProdVerified);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod actions;
pub mod approval;
pub mod artifacts;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod environment;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actions::{
        Action, ApprovalAction, BuildDeployAction, DeployBackend, FnAction, SmokeTestAction,
        SmokeTestRunner, SourceAction, SourceProvider,
    };
    pub use crate::approval::{
        ApprovalNotifier, ApprovalRecord, ApprovalService, ApprovalState, Decision,
        DecisionRequest,
    };
    pub use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
    pub use crate::config::PipelineConfig;
    pub use crate::context::ActionContext;
    pub use crate::core::{
        ActionKind, ActionOutput, ActionStatus, Artifact, ExecutionStatus, FailureKind,
        PipelineEvent,
    };
    pub use crate::environment::{Environment, EnvironmentTier, PromotionState};
    pub use crate::errors::{DeployflowError, PipelineValidationError, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        standard_pipeline, ActionSpec, Collaborators, ExecutionHandle, ExecutionStore,
        Orchestrator, Pipeline, PipelineBuilder, PipelineExecution, SourceEvent, StageSpec,
    };
    pub use crate::utils::{generate_uuid, iso_timestamp};
}
