//! Scoped value frames with outward-walking name resolution.

use super::BindingTable;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One group's accumulated values.
///
/// The frame carries the binding table of the group that owns it, so a
/// lookup crossing the frame boundary is translated from child-local to
/// group-local naming.
#[derive(Debug, Default)]
pub struct Frame {
    bindings: BindingTable,
    values: HashMap<String, serde_json::Value>,
    locked: HashSet<String>,
}

impl Frame {
    /// Creates a frame for a group with the given bindings and locked
    /// input values.
    #[must_use]
    pub fn new(
        bindings: BindingTable,
        locked_inputs: HashMap<String, serde_json::Value>,
    ) -> Self {
        let locked = locked_inputs.keys().cloned().collect();
        Self {
            bindings,
            values: locked_inputs,
            locked,
        }
    }

    /// Gets a group-local value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values.get(name)
    }

    /// Returns all group-local values, consuming the frame.
    #[must_use]
    pub fn into_values(self) -> HashMap<String, serde_json::Value> {
        self.values
    }

    /// Returns true if the name was fixed by the group's parent.
    #[must_use]
    pub fn is_locked(&self, name: &str) -> bool {
        self.locked.contains(name)
    }
}

/// The stack of frames for the groups currently executing.
///
/// The outermost frame holds the host configuration surface; each nested
/// group pushes a frame on entry and pops it on exit.
#[derive(Debug, Default)]
pub struct ScopeChain {
    frames: Vec<Frame>,
}

impl ScopeChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame for a group being entered.
    pub fn push_frame(
        &mut self,
        bindings: BindingTable,
        locked_inputs: HashMap<String, serde_json::Value>,
    ) {
        self.frames.push(Frame::new(bindings, locked_inputs));
    }

    /// Pops the innermost frame when its group completes.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Returns the nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Resolves a child-local name relative to the innermost frame.
    ///
    /// The name is translated through each frame's binding table on the
    /// way out, so a stage asking for `refresh_token` finds the value its
    /// group published as `standalone_refresh_token` at the root.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&serde_json::Value> {
        let mut current = name;
        for frame in self.frames.iter().rev() {
            current = frame.bindings.parent_name(current);
            if let Some(value) = frame.values.get(current) {
                return Some(value);
            }
        }
        None
    }

    /// Merges a child-local-named value into the innermost frame.
    ///
    /// Returns false (leaving the existing value in place) when the
    /// translated name was locked by the group's parent.
    pub fn insert(&mut self, name: &str, value: serde_json::Value) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        let local = frame.bindings.parent_name(name).to_string();
        if frame.locked.contains(&local) {
            debug!(name = %local, "ignoring write to locked input");
            return false;
        }
        frame.values.insert(local, value);
        true
    }
}
