//! External collaborator contracts.
//!
//! The engine performs no I/O of its own. Everything that touches the
//! network or a browser - the authorization redirect, the token endpoint,
//! capability discovery, FHIR resource access - sits behind one of these
//! narrow async traits and is injected at flow construction.

use crate::credentials::CredentialBundle;
use crate::flow::FlowVariant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// A collaborator call that could not be completed.
///
/// These map to `StageStatus::Error` - the test could not run - never to
/// `Fail`, which is reserved for confirmed violations.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// The call exceeded the collaborator's deadline.
    #[error("Collaborator call timed out")]
    Timeout,

    /// The endpoint answered with an unusable HTTP status.
    #[error("Unexpected HTTP status {status}")]
    Http {
        /// The response status code.
        status: u16,
        /// The response body, when captured.
        body: Option<String>,
    },

    /// The response violated the wire protocol (unparseable body,
    /// missing redirect parameter, state mismatch).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The host aborted the run while the call was in flight.
    #[error("Call abandoned: run aborted")]
    Aborted,
}

/// HTTP method a request should use where the protocol allows a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    /// Query-string request.
    Get,
    /// Form-encoded body request.
    Post,
}

impl RequestMethod {
    /// Parses the lowercase form used in configuration values.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            _ => None,
        }
    }
}

/// PKCE parameters attached to an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceParams {
    /// The derived code challenge.
    pub code_challenge: String,
    /// The challenge method (`S256`).
    pub code_challenge_method: String,
}

/// Parameters for initiating the authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// The registered client id.
    pub client_id: String,
    /// The redirect URI the app registered.
    pub redirect_uri: String,
    /// The requested scope string.
    pub scope: String,
    /// Opaque state echoed back on the redirect.
    pub state: String,
    /// The FHIR server the token will be used against (`aud`).
    pub aud: String,
    /// PKCE parameters, when enabled.
    pub pkce: Option<PkceParams>,
    /// GET or POST authorization request.
    pub method: RequestMethod,
}

/// The authorization code handed back on the redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    /// The single-use authorization code.
    pub code: String,
    /// The state parameter echoed by the server, if any.
    pub state: Option<String>,
}

/// Client credentials presented to the token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// The registered client id.
    pub client_id: String,
    /// The client secret for confidential clients.
    pub client_secret: Option<String>,
}

/// The raw token endpoint response, for both exchange and refresh.
///
/// A refresh response is a partial bundle: servers may omit the refresh
/// token (reusable tokens) or the granted scope (unchanged grant).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token.
    pub access_token: String,
    /// The token type (expected `Bearer`).
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// The refresh token, when granted or rotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// The OpenID Connect ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// The patient in context, per the SMART launch context extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
}

impl TokenResponse {
    /// Builds an immutable credential bundle from this response.
    ///
    /// When the response omits a refresh token or scope, the prior
    /// bundle's values are carried forward: both single-use and reusable
    /// refresh tokens are conformant.
    #[must_use]
    pub fn to_bundle(
        &self,
        retrieved_at: DateTime<Utc>,
        prior_refresh_token: Option<&str>,
        prior_scopes: &[String],
    ) -> CredentialBundle {
        let scopes = self.scope.as_ref().map_or_else(
            || prior_scopes.to_vec(),
            |scope| scope.split_whitespace().map(ToString::to_string).collect(),
        );
        CredentialBundle {
            access_token: self.access_token.clone(),
            refresh_token: self
                .refresh_token
                .clone()
                .or_else(|| prior_refresh_token.map(ToString::to_string)),
            id_token: self.id_token.clone(),
            token_type: self.token_type.clone(),
            scopes,
            expires_at: CredentialBundle::expiry_from_lifetime(retrieved_at, self.expires_in),
            retrieved_at,
        }
    }
}

/// The HTTP-level outcome of a resource access attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOutcome {
    /// The HTTP status code.
    pub status: u16,
    /// The returned resource, when the server produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
}

impl ResourceOutcome {
    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Drives the human-mediated authorization redirect.
#[async_trait]
pub trait AuthorizationEndpoint: Send + Sync + Debug {
    /// Initiates the redirect and waits for the callback.
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationGrant, CollaboratorError>;
}

/// Exchanges codes and refresh tokens for tokens.
#[async_trait]
pub trait TokenEndpoint: Send + Sync + Debug {
    /// Exchanges an authorization code for tokens.
    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
        redirect_uri: &str,
        credentials: &ClientCredentials,
    ) -> Result<TokenResponse, CollaboratorError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(
        &self,
        refresh_token: &str,
        credentials: &ClientCredentials,
        scope: Option<&str>,
    ) -> Result<TokenResponse, CollaboratorError>;
}

/// Fetches the server's advertised SMART capability set.
#[async_trait]
pub trait CapabilityDiscovery: Send + Sync + Debug {
    /// Reads the discovery document for the given protocol version.
    async fn fetch_capabilities(
        &self,
        variant: FlowVariant,
    ) -> Result<HashSet<String>, CollaboratorError>;
}

/// Attempts FHIR resource reads with or without a credential.
#[async_trait]
pub trait ResourceAccess: Send + Sync + Debug {
    /// Reads a resource in the patient's compartment and reports the
    /// HTTP-level outcome. `access_token: None` probes unauthenticated
    /// access.
    async fn read(
        &self,
        resource_type: &str,
        patient_id: &str,
        access_token: Option<&str>,
    ) -> Result<ResourceOutcome, CollaboratorError>;
}

/// The full set of injected collaborators for a run.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Authorization redirect driver.
    pub authorization: Arc<dyn AuthorizationEndpoint>,
    /// Token endpoint client.
    pub tokens: Arc<dyn TokenEndpoint>,
    /// Capability discovery client.
    pub discovery: Arc<dyn CapabilityDiscovery>,
    /// FHIR resource access client.
    pub resources: Arc<dyn ResourceAccess>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refresh_response() -> TokenResponse {
        TokenResponse {
            access_token: "new-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            scope: None,
            refresh_token: None,
            id_token: None,
            patient: None,
        }
    }

    #[test]
    fn test_to_bundle_reuses_prior_refresh_token() {
        let prior_scopes = vec!["openid".to_string()];
        let bundle = refresh_response().to_bundle(Utc::now(), Some("r1"), &prior_scopes);

        assert_eq!(bundle.refresh_token.as_deref(), Some("r1"));
        assert_eq!(bundle.scopes, prior_scopes);
    }

    #[test]
    fn test_to_bundle_prefers_rotated_refresh_token() {
        let mut response = refresh_response();
        response.refresh_token = Some("r2".to_string());
        let bundle = response.to_bundle(Utc::now(), Some("r1"), &[]);

        assert_eq!(bundle.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn test_to_bundle_splits_new_scope() {
        let mut response = refresh_response();
        response.scope = Some("openid fhirUser".to_string());
        let bundle = response.to_bundle(Utc::now(), None, &["openid".to_string()]);

        assert_eq!(bundle.scopes, vec!["openid", "fhirUser"]);
    }

    #[test]
    fn test_to_bundle_computes_expiry() {
        let now = Utc::now();
        let bundle = refresh_response().to_bundle(now, None, &[]);
        assert_eq!(bundle.expires_at, Some(now + chrono::Duration::seconds(3600)));
    }

    #[test]
    fn test_resource_outcome_success_classes() {
        assert!(ResourceOutcome { status: 200, resource: None }.is_success());
        assert!(!ResourceOutcome { status: 401, resource: None }.is_success());
        assert!(!ResourceOutcome { status: 404, resource: None }.is_success());
    }

    #[test]
    fn test_request_method_from_config() {
        assert_eq!(RequestMethod::from_config("get"), Some(RequestMethod::Get));
        assert_eq!(RequestMethod::from_config("post"), Some(RequestMethod::Post));
        assert_eq!(RequestMethod::from_config("PUT"), None);
    }
}
