//! Stage groups: ordered trees of stages with binding tables.
//!
//! A group owns an ordered list of children (stages or nested groups), a
//! binding table renaming its children's names into its own, optional
//! locked inputs fixed by the parent, and a fail-fast flag for subtrees
//! where one failure makes every later check meaningless.

mod runner;
#[cfg(test)]
mod runner_tests;

pub use runner::GroupRunner;

use crate::context::BindingTable;
use crate::stages::Stage;
use std::collections::HashMap;
use std::sync::Arc;

/// One node in a stage group tree.
#[derive(Debug, Clone)]
pub enum FlowNode {
    /// A leaf conformance check.
    Stage(Arc<dyn Stage>),
    /// A nested group.
    Group(StageGroup),
}

impl FlowNode {
    /// The node's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Stage(stage) => stage.name(),
            Self::Group(group) => group.name(),
        }
    }
}

/// An ordered collection of stages and nested groups.
#[derive(Debug, Clone, Default)]
pub struct StageGroup {
    name: String,
    children: Vec<FlowNode>,
    bindings: BindingTable,
    locked_inputs: HashMap<String, serde_json::Value>,
    fail_fast: bool,
}

impl StageGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the binding table renaming child names to group names.
    #[must_use]
    pub fn with_bindings(mut self, bindings: BindingTable) -> Self {
        self.bindings = bindings;
        self
    }

    /// Fixes an input value that children cannot override.
    #[must_use]
    pub fn lock_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.locked_inputs.insert(name.into(), value);
        self
    }

    /// Marks the group fail-fast: one failed child skips the rest of the
    /// group (a failed authorization makes its dependents meaningless).
    #[must_use]
    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Appends a stage child.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.children.push(FlowNode::Stage(Arc::new(stage)));
        self
    }

    /// Appends an already-shared stage child.
    #[must_use]
    pub fn stage_arc(mut self, stage: Arc<dyn Stage>) -> Self {
        self.children.push(FlowNode::Stage(stage));
        self
    }

    /// Appends a nested group child.
    #[must_use]
    pub fn group(mut self, group: StageGroup) -> Self {
        self.children.push(FlowNode::Group(group));
        self
    }

    /// The group's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered children.
    #[must_use]
    pub fn children(&self) -> &[FlowNode] {
        &self.children
    }

    /// The group's binding table.
    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// The inputs fixed by the parent.
    #[must_use]
    pub fn locked_inputs(&self) -> &HashMap<String, serde_json::Value> {
        &self.locked_inputs
    }

    /// Whether the group aborts on the first failed child.
    #[must_use]
    pub fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// The group-local names of every output its subtree can publish.
    ///
    /// Declaration order is preserved; duplicates (two children feeding
    /// the same logical value) appear once.
    #[must_use]
    pub fn produced_outputs(&self) -> Vec<String> {
        let mut outputs: Vec<String> = Vec::new();
        for child in &self.children {
            let child_outputs: Vec<String> = match child {
                FlowNode::Stage(stage) => stage
                    .produced_outputs()
                    .iter()
                    .map(|name| self.bindings.parent_name(name).to_string())
                    .collect(),
                FlowNode::Group(group) => group
                    .produced_outputs()
                    .into_iter()
                    .map(|name| self.bindings.parent_name(&name).to_string())
                    .collect(),
            };
            for name in child_outputs {
                if !outputs.contains(&name) {
                    outputs.push(name);
                }
            }
        }
        outputs
    }
}
