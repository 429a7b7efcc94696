//! Test support: mock stages, mock collaborators, and fixtures.
//!
//! Exposed publicly so host test suites can script server behavior
//! without a live authorization server.

mod fixtures;
mod mocks;

pub use fixtures::{unsigned_id_token, uscdi_token_response};
pub use mocks::{
    MockAuthorizationEndpoint, MockDiscovery, MockResourceAccess, MockStage,
    MockTokenEndpoint,
};
