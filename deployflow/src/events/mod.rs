//! Event sink system for observability.
//!
//! The orchestrator emits a [`PipelineEvent`](crate::core::PipelineEvent) at
//! every execution, stage and action boundary. Sinks never block or fail the
//! pipeline.

mod sink;

pub use sink::{CollectingEventSink, EventSink, FanoutEventSink, LoggingEventSink, NoOpEventSink};
