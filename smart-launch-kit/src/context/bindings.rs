//! Child-to-parent name renaming tables.

use crate::errors::BindingError;
use std::collections::HashMap;

/// A conflict-free renaming from child-local names to group-local names.
///
/// The table is total: a name with no explicit binding passes through
/// unchanged. Two different children binding the same group-local name
/// are expected to agree on its meaning (e.g. both referring to the
/// current credential bundle); the table cannot check that, only the
/// one-binding-per-child-name rule.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    child_to_parent: HashMap<String, String>,
}

impl BindingTable {
    /// Creates an identity table (every name passes through unchanged).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding from a child-local name to a group-local name.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::DuplicateChild` if the child name is
    /// already bound, or `BindingError::EmptyName` for blank names.
    pub fn bind(
        mut self,
        child: impl Into<String>,
        parent: impl Into<String>,
    ) -> Result<Self, BindingError> {
        let child = child.into();
        let parent = parent.into();

        if child.is_empty() || parent.is_empty() {
            return Err(BindingError::EmptyName { child, parent });
        }
        if self.child_to_parent.contains_key(&child) {
            return Err(BindingError::DuplicateChild { child });
        }

        self.child_to_parent.insert(child, parent);
        Ok(self)
    }

    /// Translates a child-local name into the group-local name.
    #[must_use]
    pub fn parent_name<'a>(&'a self, child: &'a str) -> &'a str {
        self.child_to_parent
            .get(child)
            .map_or(child, String::as_str)
    }

    /// Returns true if the table has no explicit renamings.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.child_to_parent.is_empty()
    }

    /// Returns the number of explicit bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.child_to_parent.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.child_to_parent.is_empty()
    }
}
