//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage and action specifications
//! - The pipeline builder with topology validation
//! - The standard Source → Test → Prod topology
//! - The orchestrator and its execution records
//! - Execution stores for status queries and audit

mod builder;
mod execution;
mod orchestrator;
mod spec;
mod store;
mod topology;
mod trigger;


pub use builder::PipelineBuilder;
pub use execution::{ActionRecord, FailureInfo, PipelineExecution, StageRecord};
pub use orchestrator::{ExecutionHandle, Orchestrator};
pub use spec::{ActionSpec, StageSpec};
pub use store::{ExecutionStore, FileExecutionStore, InMemoryExecutionStore};
pub use topology::{names, standard_pipeline, Collaborators, Pipeline};
pub use trigger::SourceEvent;
