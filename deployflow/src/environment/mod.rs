//! Deployment environments and the promotion state machine.

mod promotion;

pub use promotion::{Milestone, PromotionState};

use crate::config::EnvironmentConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of an environment in the promotion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTier {
    /// Pre-production environment where artifacts are verified and approved.
    Test,
    /// Production; only receives artifacts that passed test.
    Prod,
}

impl fmt::Display for EnvironmentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

/// A named deployment target with its own permission scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name (e.g., "test").
    pub name: String,
    /// Promotion tier.
    pub tier: EnvironmentTier,
    /// Role that build and deploy actions assume in this environment.
    pub role: String,
    /// Variables injected into every build of this environment.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an environment.
    #[must_use]
    pub fn new(name: impl Into<String>, tier: EnvironmentTier, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier,
            role: role.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Builds an environment from its configuration section.
    #[must_use]
    pub fn from_config(tier: EnvironmentTier, config: &EnvironmentConfig) -> Self {
        Self {
            name: config.name.clone(),
            tier,
            role: config.role.clone(),
            variables: config.variables.clone(),
        }
    }

    /// Adds an injected variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Returns true for the production tier.
    #[must_use]
    pub fn is_prod(&self) -> bool {
        self.tier == EnvironmentTier::Prod
    }
}
