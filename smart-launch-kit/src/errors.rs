//! Error types for the flow engine.
//!
//! Stage-level problems never surface here: every stage run contract
//! returns a [`crate::core::StageResult`] instead of raising. These types
//! cover construction-time defects (malformed binding tables, invalid
//! configuration) and run-level interruptions.

use thiserror::Error;

/// The main error type for flow construction and execution.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A binding table was malformed.
    #[error("{0}")]
    Binding(#[from] BindingError),

    /// A required configuration value was missing or malformed.
    ///
    /// Not attributable to the server under test.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run was cancelled by the host.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Error raised when a binding table is not a conflict-free renaming.
#[derive(Debug, Clone, Error)]
pub enum BindingError {
    /// The same child name was bound twice.
    #[error("Duplicate binding for child name '{child}'")]
    DuplicateChild {
        /// The child-local name bound more than once.
        child: String,
    },

    /// A binding used an empty name on either side.
    #[error("Empty name in binding '{child}' -> '{parent}'")]
    EmptyName {
        /// The child-local name.
        child: String,
        /// The group-local name.
        parent: String,
    },
}
