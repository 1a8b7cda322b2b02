//! Core domain model types for deployflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Action kind, action status, execution status and failure classification
//! - Action output type with factory methods
//! - Artifacts and pipeline events

mod artifact;
mod event;
mod output;
mod status;

pub use artifact::{Artifact, APP_CODE, INFRA_CODE};
pub use event::PipelineEvent;
pub use output::{keys, ActionOutput};
pub use status::{ActionKind, ActionStatus, ExecutionStatus, FailureKind, StageStatus};
