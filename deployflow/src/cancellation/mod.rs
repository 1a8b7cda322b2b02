//! Cooperative cancellation for pipeline executions.
//!
//! Cancellation is checked at stage and run-order boundaries only; an action
//! that is already running is allowed to finish.

mod token;

pub use token::{CancellationRegistry, CancellationToken};
