//! Status enums for turns and saved lists.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resumption marker persisted on every interaction.
///
/// Stored as plain text so rows written by newer builds with markers this
/// build does not know about still load; parsing them yields
/// [`UnknownStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    /// Deferred providers still need to be searched.
    SecondarySearch,
    /// Results are gathered; the model still owes its top picks.
    SecondaryStep,
    /// The turn is finished.
    Complete,
}

impl NextStep {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SecondarySearch => "secondary_search",
            Self::SecondaryStep => "secondary_step",
            Self::Complete => "complete",
        }
    }

    /// Whether the turn has reached its terminal step.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for NextStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored marker that does not name any known step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resumption marker: {0:?}")]
pub struct UnknownStep(pub String);

impl std::str::FromStr for NextStep {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secondary_search" => Ok(Self::SecondarySearch),
            "secondary_step" => Ok(Self::SecondaryStep),
            "complete" => Ok(Self::Complete),
            other => Err(UnknownStep(other.to_string())),
        }
    }
}

/// Per-user saved product lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "saved_list", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SavedList {
    Cart,
    Wishlist,
}

impl std::fmt::Display for SavedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cart => write!(f, "cart"),
            Self::Wishlist => write!(f, "wishlist"),
        }
    }
}

impl std::str::FromStr for SavedList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(Self::Cart),
            "wishlist" => Ok(Self::Wishlist),
            _ => Err(format!("invalid saved list: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_step_roundtrip() {
        for step in [
            NextStep::SecondarySearch,
            NextStep::SecondaryStep,
            NextStep::Complete,
        ] {
            assert_eq!(step.as_str().parse::<NextStep>(), Ok(step));
        }
    }

    #[test]
    fn test_next_step_unknown_marker() {
        let err = "noon_search".parse::<NextStep>().unwrap_err();
        assert_eq!(err, UnknownStep("noon_search".to_string()));
    }

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(NextStep::Complete.is_terminal());
        assert!(!NextStep::SecondaryStep.is_terminal());
        assert!(!NextStep::SecondarySearch.is_terminal());
    }

    #[test]
    fn test_next_step_serde_matches_as_str() {
        let json = serde_json::to_string(&NextStep::SecondaryStep).expect("serialize");
        assert_eq!(json, "\"secondary_step\"");
    }
}
