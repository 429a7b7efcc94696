//! Binding tables and the scoped value context.
//!
//! Values produced by stages travel under names. A [`BindingTable`]
//! renames a child's local names to its enclosing group's names; the
//! [`ScopeChain`] resolves a lookup by walking outward through enclosing
//! group frames, translating the name at each boundary.

mod bindings;
mod chain;

pub use bindings::BindingTable;
pub use chain::{Frame, ScopeChain};
