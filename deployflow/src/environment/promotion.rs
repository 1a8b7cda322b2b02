//! The environment promotion state machine.
//!
//! ```text
//! NotDeployed -> TestDeployed -> TestVerified -> Approved -> ProdDeployed -> ProdVerified
//! ```
//!
//! Each arrow is the success of exactly one action. States are never skipped;
//! a failure leaves the execution frozen where it is.

use super::EnvironmentTier;
use crate::core::ActionKind;
use crate::errors::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far an execution's artifact has been promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionState {
    /// Nothing deployed yet.
    NotDeployed,
    /// Deployed to test.
    TestDeployed,
    /// Test deployment passed its smoke tests.
    TestVerified,
    /// A human approved promotion to prod.
    Approved,
    /// Deployed to prod.
    ProdDeployed,
    /// Prod deployment passed its smoke tests.
    ProdVerified,
}

/// An action success that moves the promotion state forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "milestone", content = "tier")]
pub enum Milestone {
    /// A build-and-deploy action succeeded.
    Deployed(EnvironmentTier),
    /// A smoke-test action succeeded.
    Verified(EnvironmentTier),
    /// The approval gate was approved.
    Approved,
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployed(tier) => write!(f, "deployed({tier})"),
            Self::Verified(tier) => write!(f, "verified({tier})"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

impl Milestone {
    /// The milestone an action of `kind` reaches when it succeeds.
    ///
    /// Deploy and smoke-test actions need an environment to count.
    #[must_use]
    pub fn for_action(kind: ActionKind, tier: Option<EnvironmentTier>) -> Option<Self> {
        match (kind, tier) {
            (ActionKind::BuildDeploy, Some(tier)) => Some(Self::Deployed(tier)),
            (ActionKind::SmokeTest, Some(tier)) => Some(Self::Verified(tier)),
            (ActionKind::Approval, _) => Some(Self::Approved),
            _ => None,
        }
    }
}

impl Default for PromotionState {
    fn default() -> Self {
        Self::NotDeployed
    }
}

impl fmt::Display for PromotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDeployed => write!(f, "not_deployed"),
            Self::TestDeployed => write!(f, "test_deployed"),
            Self::TestVerified => write!(f, "test_verified"),
            Self::Approved => write!(f, "approved"),
            Self::ProdDeployed => write!(f, "prod_deployed"),
            Self::ProdVerified => write!(f, "prod_verified"),
        }
    }
}

impl PromotionState {
    /// Every state in promotion order.
    pub const PATH: [Self; 6] = [
        Self::NotDeployed,
        Self::TestDeployed,
        Self::TestVerified,
        Self::Approved,
        Self::ProdDeployed,
        Self::ProdVerified,
    ];

    /// The only milestone that may be applied in this state.
    #[must_use]
    pub fn next_milestone(self) -> Option<Milestone> {
        match self {
            Self::NotDeployed => Some(Milestone::Deployed(EnvironmentTier::Test)),
            Self::TestDeployed => Some(Milestone::Verified(EnvironmentTier::Test)),
            Self::TestVerified => Some(Milestone::Approved),
            Self::Approved => Some(Milestone::Deployed(EnvironmentTier::Prod)),
            Self::ProdDeployed => Some(Milestone::Verified(EnvironmentTier::Prod)),
            Self::ProdVerified => None,
        }
    }

    /// Returns true if `milestone` is the next transition.
    #[must_use]
    pub fn permits(self, milestone: Milestone) -> bool {
        self.next_milestone() == Some(milestone)
    }

    /// Applies a milestone.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the milestone would skip or repeat a state.
    pub fn advance(self, milestone: Milestone) -> Result<Self, TransitionError> {
        if !self.permits(milestone) {
            return Err(TransitionError {
                from: self,
                milestone,
            });
        }
        Ok(match milestone {
            Milestone::Deployed(EnvironmentTier::Test) => Self::TestDeployed,
            Milestone::Verified(EnvironmentTier::Test) => Self::TestVerified,
            Milestone::Approved => Self::Approved,
            Milestone::Deployed(EnvironmentTier::Prod) => Self::ProdDeployed,
            Milestone::Verified(EnvironmentTier::Prod) => Self::ProdVerified,
        })
    }

    /// Returns true once the artifact is verified in prod.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::ProdVerified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_path() {
        let mut state = PromotionState::NotDeployed;
        let mut visited = vec![state];
        while let Some(milestone) = state.next_milestone() {
            state = state.advance(milestone).unwrap();
            visited.push(state);
        }
        assert_eq!(visited, PromotionState::PATH.to_vec());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_cannot_skip_approval() {
        let err = PromotionState::TestVerified
            .advance(Milestone::Deployed(EnvironmentTier::Prod))
            .unwrap_err();
        assert_eq!(err.from, PromotionState::TestVerified);
        assert!(err.to_string().contains("deployed(prod)"));
    }

    #[test]
    fn test_cannot_repeat_state() {
        assert!(PromotionState::TestDeployed
            .advance(Milestone::Deployed(EnvironmentTier::Test))
            .is_err());
    }

    #[test]
    fn test_prod_changes_require_approval() {
    }

    #[test]
    fn test_milestone_for_action() {
        assert_eq!(
            Milestone::for_action(ActionKind::BuildDeploy, Some(EnvironmentTier::Prod)),
            Some(Milestone::Deployed(EnvironmentTier::Prod))
        );
        assert_eq!(Milestone::for_action(ActionKind::Approval, None), Some(Milestone::Approved));
        assert_eq!(Milestone::for_action(ActionKind::SmokeTest, None), None);
        assert_eq!(Milestone::for_action(ActionKind::Source, None), None);
        assert_eq!(
            Milestone::for_action(ActionKind::Custom, Some(EnvironmentTier::Test)),
            None
        );
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&PromotionState::ProdVerified).unwrap();
        assert_eq!(json, r#""prod_verified""#);
        let milestone = serde_json::to_value(Milestone::Verified(EnvironmentTier::Test)).unwrap();
        assert_eq!(milestone, serde_json::json!({"milestone": "verified", "tier": "test"}));
    }
}
