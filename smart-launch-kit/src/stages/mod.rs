//! Stage trait and the concrete conformance checks.
//!
//! Stages are the fundamental units of work: a named check with declared
//! required inputs and produced outputs. A stage never reaches around its
//! declared contract - external effects go through injected collaborators,
//! so a stage is deterministic given its inputs and the collaborator's
//! response.

mod discovery;
mod export;
mod launch;
mod openid;
mod patient_context;
mod refresh;
mod resource_access;
mod scope_grant;
mod unauthorized;

pub use discovery::WellKnownCapabilitiesStage;
pub use export::CredentialsExportStage;
pub use launch::{AuthorizationRequestStage, CodeExchangeStage};
pub use openid::OpenIdIdentityStage;
pub use patient_context::PatientContextStage;
pub use refresh::TokenRefreshStage;
pub use resource_access::UnrestrictedResourceAccessStage;
pub use scope_grant::ScopeGrantStage;
pub use unauthorized::UnauthorizedAccessStage;

use crate::cancellation::RunToken;
use crate::collaborators::CollaboratorError;
use crate::core::StageResult;
use crate::credentials::{CredentialBundle, CredentialHandle, CredentialStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for conformance test stages.
///
/// The enclosing group - not the stage - enforces the input precondition:
/// `run` is only invoked once every required input resolved, otherwise
/// the group records a SKIP on the stage's behalf.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Input names that must be present for the stage to run.
    fn required_inputs(&self) -> &[&str];

    /// Input names the stage reads when available.
    fn optional_inputs(&self) -> &[&str] {
        &[]
    }

    /// Output names the stage publishes on success.
    fn produced_outputs(&self) -> &[&str];

    /// Executes the check.
    async fn run(&self, ctx: &StageContext<'_>) -> StageResult;
}

/// The resolved inputs and shared run state handed to a stage.
pub struct StageContext<'a> {
    inputs: HashMap<String, serde_json::Value>,
    store: &'a CredentialStore,
    token: &'a RunToken,
    path: String,
}

impl<'a> StageContext<'a> {
    /// Creates a stage context.
    #[must_use]
    pub fn new(
        inputs: HashMap<String, serde_json::Value>,
        store: &'a CredentialStore,
        token: &'a RunToken,
        path: impl Into<String>,
    ) -> Self {
        Self {
            inputs,
            store,
            token,
            path: path.into(),
        }
    }

    /// Gets an input value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.inputs.get(name)
    }

    /// Gets an input as a string slice.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(serde_json::Value::as_str)
    }

    /// Gets a boolean input, accepting JSON booleans and the string
    /// forms `"true"`/`"false"` used by host configuration surfaces.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.inputs.get(name)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolves a credential-handle input into its bundle.
    #[must_use]
    pub fn bundle(&self, name: &str) -> Option<Arc<CredentialBundle>> {
        let handle: CredentialHandle = self.get_str(name)?.parse().ok()?;
        self.store.get(handle)
    }

    /// The shared credential store.
    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        self.store
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn run_token(&self) -> &RunToken {
        self.token
    }

    /// The stage's path in the group tree.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Maps a collaborator failure into an ERROR result - the check could
/// not be completed, which is distinct from a confirmed violation.
pub(crate) fn transport_error(what: &str, err: &CollaboratorError) -> StageResult {
    StageResult::error(format!("{what}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialBundle;
    use chrono::Utc;

    fn store_with_bundle() -> (CredentialStore, CredentialHandle) {
        let store = CredentialStore::new();
        let handle = store.put(CredentialBundle {
            access_token: "at".to_string(),
            refresh_token: None,
            id_token: None,
            token_type: "Bearer".to_string(),
            scopes: vec![],
            expires_at: None,
            retrieved_at: Utc::now(),
        });
        (store, handle)
    }

    #[test]
    fn test_context_typed_getters() {
        let store = CredentialStore::new();
        let token = RunToken::new();
        let mut inputs = HashMap::new();
        inputs.insert("name".to_string(), serde_json::json!("value"));
        inputs.insert("flag".to_string(), serde_json::json!("true"));
        inputs.insert("native".to_string(), serde_json::json!(false));

        let ctx = StageContext::new(inputs, &store, &token, "test");
        assert_eq!(ctx.get_str("name"), Some("value"));
        assert_eq!(ctx.get_bool("flag"), Some(true));
        assert_eq!(ctx.get_bool("native"), Some(false));
        assert_eq!(ctx.get_bool("name"), None);
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_context_resolves_bundle_handle() {
        let (store, handle) = store_with_bundle();
        let token = RunToken::new();
        let mut inputs = HashMap::new();
        inputs.insert(
            "smart_credentials".to_string(),
            serde_json::json!(handle.to_string()),
        );

        let ctx = StageContext::new(inputs, &store, &token, "test");
        let bundle = ctx.bundle("smart_credentials").unwrap();
        assert_eq!(bundle.access_token, "at");
        assert!(ctx.bundle("missing").is_none());
    }

    #[test]
    fn test_transport_error_maps_to_error_status() {
        let result = transport_error(
            "token exchange",
            &CollaboratorError::Timeout,
        );
        assert_eq!(result.status, crate::core::StageStatus::Error);
        assert!(result.message.unwrap().contains("token exchange"));
    }
}
