//! Stage result type with factory methods.

use super::StageStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result of a stage execution.
///
/// `StageResult` is immutable once created and provides factory methods
/// for each status. Outputs are named values merged into the enclosing
/// group's context through its binding table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// The outcome classification.
    pub status: StageStatus,

    /// Named output values (child-local names).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub outputs: HashMap<String, serde_json::Value>,

    /// Diagnostic message (the violated rule for failures, the cause for
    /// errors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The unmet dependency name (for skipped executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmet_dependency: Option<String>,
}

impl Default for StageResult {
    fn default() -> Self {
        Self::pass()
    }
}

impl StageResult {
    /// Creates a passing result with no outputs.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            status: StageStatus::Pass,
            outputs: HashMap::new(),
            message: None,
            unmet_dependency: None,
        }
    }

    /// Creates a passing result with outputs.
    #[must_use]
    pub fn pass_with(outputs: HashMap<String, serde_json::Value>) -> Self {
        Self {
            status: StageStatus::Pass,
            outputs,
            message: None,
            unmet_dependency: None,
        }
    }

    /// Creates a failing result naming the violated rule.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            outputs: HashMap::new(),
            message: Some(message.into()),
            unmet_dependency: None,
        }
    }

    /// Creates a skip result naming the unmet dependency.
    #[must_use]
    pub fn skip_missing(dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        Self {
            status: StageStatus::Skip,
            outputs: HashMap::new(),
            message: Some(format!("required input '{dependency}' was never produced")),
            unmet_dependency: Some(dependency),
        }
    }

    /// Creates a skip result with a free-form reason (fail-fast aborts).
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skip,
            outputs: HashMap::new(),
            message: Some(reason.into()),
            unmet_dependency: None,
        }
    }

    /// Creates an error result for a check that could not be completed.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Error,
            outputs: HashMap::new(),
            message: Some(message.into()),
            unmet_dependency: None,
        }
    }

    /// Adds a single output value.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(name.into(), value);
        self
    }

    /// Sets the diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Gets an output value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.outputs.get(name)
    }

    /// Returns true if the result passed.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.status.is_pass()
    }

    /// Returns true for a confirmed violation or an incomplete check.
    #[must_use]
    pub fn is_problem(&self) -> bool {
        self.status.is_problem()
    }
}
