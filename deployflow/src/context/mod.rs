//! Context handed to actions while they run.
//!
//! This module provides:
//! - The execution identity (execution id, pipeline, commit)
//! - A read-only view of earlier action outputs
//! - The per-action context with artifact access and event emission

mod action;
mod identity;
mod inputs;

pub use action::ActionContext;
pub use identity::ExecutionIdentity;
pub use inputs::{ActionInputs, PriorOutput};
