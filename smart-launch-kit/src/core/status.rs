//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome classification of a stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The server under test satisfied the checked rule.
    Pass,
    /// The server under test violated the checked rule.
    Fail,
    /// A required input never materialized; the check was not attempted.
    Skip,
    /// The check could not be completed (collaborator failure or bad
    /// configuration), distinct from a confirmed violation.
    Error,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Skip
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Skip => write!(f, "skip"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates the check was attempted and
    /// satisfied.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Returns true if the status indicates a confirmed violation.
    #[must_use]
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Returns true if the check was not attempted.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }

    /// Returns true for any non-passing attempted outcome.
    #[must_use]
    pub fn is_problem(&self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}
