//! # smart-launch-kit
//!
//! A conformance test flow engine for the SMART App Launch "Standalone
//! Launch" sequence (OAuth2 authorization code grant with OpenID Connect
//! identity and refresh token extensions).
//!
//! The engine drives a client through launch, token exchange, identity
//! validation, scoped resource access, token refresh, and negative access
//! checks, and asserts that the server under test behaves per specification:
//!
//! - **Stage-based execution**: discrete conformance checks with declared
//!   inputs and outputs
//! - **Stage groups with binding tables**: named values are renamed and
//!   threaded between stages, walking outward through enclosing scopes
//! - **Credential lifecycle**: authorization code, access token, refresh,
//!   and re-issued tokens tracked as immutable bundles
//! - **Protocol version branching**: STU1 and STU2 capability sets and
//!   scope grammars selected once per run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smart_launch_kit::prelude::*;
//!
//! let flow = StandaloneLaunchFlow::new(
//!     FlowVariant::Stu1,
//!     FlowConfig::new("https://fhir.example.com", "my-client", "my-secret"),
//!     collaborators,
//! )?;
//!
//! let outcome = flow.run().await?;
//! for record in &outcome.report.records {
//!     println!("{} {}", record.status, record.path);
//! }
//! ```
//!
//! All network and browser interaction is delegated to injected
//! collaborators; the engine itself performs no I/O.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod collaborators;
pub mod context;
pub mod core;
pub mod credentials;
pub mod errors;
pub mod flow;
pub mod group;
pub mod pkce;
pub mod scopes;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::RunToken;
    pub use crate::collaborators::{
        AuthorizationEndpoint, AuthorizationGrant, AuthorizationRequest,
        CapabilityDiscovery, ClientCredentials, CollaboratorError,
        Collaborators, RequestMethod, ResourceAccess, ResourceOutcome,
        TokenEndpoint, TokenResponse,
    };
    pub use crate::context::{BindingTable, ScopeChain};
    pub use crate::core::{StageRecord, StageResult, StageStatus, RunReport};
    pub use crate::credentials::{
        CredentialBundle, CredentialHandle, CredentialStore,
    };
    pub use crate::errors::{BindingError, FlowError};
    pub use crate::flow::{
        FlowConfig, FlowOutcome, FlowState, FlowVariant, StandaloneLaunchFlow,
    };
    pub use crate::group::{FlowNode, StageGroup};
    pub use crate::scopes::{
        evaluate, Compartment, ScopeGrantResult, ScopeRequest, ScopeVersion,
    };
    pub use crate::stages::{Stage, StageContext};
}
