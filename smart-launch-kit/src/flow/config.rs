//! Host configuration surface.

use crate::errors::FlowError;
use serde::{Deserialize, Serialize};

/// The named inputs the orchestrator reads at entry.
///
/// The host collects these however it likes (CLI flags, UI form); the
/// flow treats them as an opaque key-value surface seeded into the root
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// The FHIR server base URL under test.
    pub fhir_base_url: String,
    /// The registered client id.
    pub client_id: String,
    /// The client secret for confidential clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// The redirect URI registered for the app.
    pub redirect_uri: String,
    /// Overrides the variant's default requested-scope string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_scopes: Option<String>,
}

impl FlowConfig {
    /// Creates a confidential-client configuration with the default
    /// redirect URI.
    #[must_use]
    pub fn new(
        fhir_base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            fhir_base_url: fhir_base_url.into(),
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            redirect_uri: "http://localhost:4567/custom/smart/redirect".to_string(),
            requested_scopes: None,
        }
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Overrides the requested-scope string.
    #[must_use]
    pub fn with_requested_scopes(mut self, scopes: impl Into<String>) -> Self {
        self.requested_scopes = Some(scopes.into());
        self
    }

    /// Checks the inputs a run cannot start without.
    pub(crate) fn validate(&self) -> Result<(), FlowError> {
        for (name, value) in [
            ("fhir_base_url", &self.fhir_base_url),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(FlowError::Configuration(format!(
                    "required input '{name}' is empty"
                )));
            }
        }
        Ok(())
    }
}
