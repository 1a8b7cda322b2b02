//! Tracing subscriber setup and span helpers.

use crate::errors::DeployflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json_format: bool,
    /// Include the event target.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_with_target() -> bool {
    true
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_format: false,
            with_target: default_with_target(),
        }
    }
}

impl TracingConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables JSON output.
    #[must_use]
    pub fn with_json_format(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Sets the fallback filter.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`.
///
/// # Errors
///
/// Returns `DeployflowError::Internal` if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), DeployflowError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json_format {
        registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };
    result.map_err(|e| DeployflowError::Internal(format!("failed to install tracing subscriber: {e}")))
}

/// Span attributes describing one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSpanAttributes {
    /// Pipeline name.
    pub pipeline: Option<String>,
    /// Execution ID.
    pub execution_id: Option<String>,
    /// Commit being delivered.
    pub commit_id: Option<String>,
    /// Trigger kind.
    pub trigger: Option<String>,
}

impl ExecutionSpanAttributes {
    /// Creates empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// Sets the execution ID.
    #[must_use]
    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    /// Sets the commit.
    #[must_use]
    pub fn with_commit_id(mut self, commit_id: Option<&str>) -> Self {
        self.commit_id = commit_id.map(str::to_string);
        self
    }

    /// Sets the trigger kind.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Flattens into dotted attribute keys.
    #[must_use]
    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        [
            ("pipeline.name", &self.pipeline),
            ("pipeline.execution_id", &self.execution_id),
            ("vcs.commit_id", &self.commit_id),
            ("pipeline.trigger", &self.trigger),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
