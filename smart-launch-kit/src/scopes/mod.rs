//! SMART scope grammar and grant conformance evaluation.
//!
//! Two disjoint scope grammars are supported, selected by
//! [`ScopeVersion`]: STU1 `compartment/Resource.permission` with
//! `read`/`write`/`*` suffixes, and STU2 `compartment/Resource.cruds`
//! with ordered permission letters. A scope parsed under one grammar can
//! never match a scope parsed under the other.

mod evaluator;
mod grammar;

pub use evaluator::{evaluate, ScopeGrantResult};
pub use grammar::{
    Access, Compartment, Cruds, ResourceScope, ResourceSelector, ScopeError,
    ScopeRequest, ScopeToken, ScopeVersion, V1Access,
};
