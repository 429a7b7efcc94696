//! Run report aggregating per-stage records.

use super::{StageResult, StageStatus};
use serde::{Deserialize, Serialize};

/// One entry in a run report.
///
/// Records are appended in execution order; no stage result is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Slash-separated path of group and stage names
    /// (e.g. `standalone_launch/code_exchange`).
    pub path: String,
    /// The stage's own name.
    pub name: String,
    /// The outcome classification.
    pub status: StageStatus,
    /// Diagnostic message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The unmet dependency for skipped stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmet_dependency: Option<String>,
}

/// The full set of stage records for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Records in execution order.
    pub records: Vec<StageRecord>,
}

impl RunReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record built from a stage result.
    pub fn record(&mut self, path: impl Into<String>, name: impl Into<String>, result: &StageResult) {
        self.records.push(StageRecord {
            path: path.into(),
            name: name.into(),
            status: result.status,
            message: result.message.clone(),
            unmet_dependency: result.unmet_dependency.clone(),
        });
    }

    /// Finds the first record whose stage name matches.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Finds a record by its full path.
    #[must_use]
    pub fn find_path(&self, path: &str) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    /// Returns the status of the named stage, if recorded.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.find(name).map(|r| r.status)
    }

    /// Returns all records with a given status.
    pub fn with_status(&self, status: StageStatus) -> impl Iterator<Item = &StageRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }

    /// Returns true if no record is a failure or error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.records.iter().all(|r| !r.status.is_problem())
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the report is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
