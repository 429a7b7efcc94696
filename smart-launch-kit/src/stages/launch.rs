//! Authorization redirect and code exchange stages.

use super::{transport_error, Stage, StageContext};
use crate::collaborators::{
    AuthorizationEndpoint, AuthorizationRequest, ClientCredentials, PkceParams,
    RequestMethod, TokenEndpoint,
};
use crate::core::StageResult;
use crate::pkce::{CodeVerifier, CHALLENGE_METHOD_S256};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Drives the authorization redirect and validates the returned state.
#[derive(Debug)]
pub struct AuthorizationRequestStage {
    authorization: Arc<dyn AuthorizationEndpoint>,
}

impl AuthorizationRequestStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(authorization: Arc<dyn AuthorizationEndpoint>) -> Self {
        Self { authorization }
    }
}

#[async_trait]
impl Stage for AuthorizationRequestStage {
    fn name(&self) -> &str {
        "authorization_request"
    }

    fn required_inputs(&self) -> &[&str] {
        &["url", "client_id", "requested_scopes", "redirect_uri"]
    }

    fn optional_inputs(&self) -> &[&str] {
        &["use_pkce", "pkce_code_challenge_method", "authorization_method"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &["code", "state", "pkce_code_verifier"]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let aud = ctx.get_str("url").unwrap_or_default().to_string();
        let client_id = ctx.get_str("client_id").unwrap_or_default().to_string();
        let scope = ctx
            .get_str("requested_scopes")
            .unwrap_or_default()
            .to_string();
        let redirect_uri = ctx.get_str("redirect_uri").unwrap_or_default().to_string();

        let method = match ctx.get_str("authorization_method") {
            None => RequestMethod::Get,
            Some(value) => match RequestMethod::from_config(value) {
                Some(method) => method,
                None => {
                    return StageResult::error(format!(
                        "unsupported authorization_method '{value}'"
                    ))
                }
            },
        };

        let use_pkce = ctx.get_bool("use_pkce").unwrap_or(false);
        let verifier = if use_pkce {
            let challenge_method = ctx
                .get_str("pkce_code_challenge_method")
                .unwrap_or(CHALLENGE_METHOD_S256);
            if challenge_method != CHALLENGE_METHOD_S256 {
                return StageResult::error(format!(
                    "unsupported pkce_code_challenge_method '{challenge_method}'"
                ));
            }
            Some(CodeVerifier::generate())
        } else {
            None
        };

        let state = Uuid::new_v4().to_string();
        let request = AuthorizationRequest {
            client_id,
            redirect_uri,
            scope,
            state: state.clone(),
            aud,
            pkce: verifier.as_ref().map(|v| PkceParams {
                code_challenge: v.challenge_s256(),
                code_challenge_method: CHALLENGE_METHOD_S256.to_string(),
            }),
            method,
        };

        let grant = match self.authorization.authorize(&request).await {
            Ok(grant) => grant,
            Err(err) => return transport_error("authorization redirect", &err),
        };

        match grant.state.as_deref() {
            None => {
                return StageResult::fail(
                    "authorization response did not include the state parameter",
                )
            }
            Some(echoed) if echoed != state => {
                return StageResult::fail(format!(
                    "authorization response state '{echoed}' does not match request state '{state}'"
                ))
            }
            Some(_) => {}
        }

        let mut result = StageResult::pass()
            .with_output("code", serde_json::json!(grant.code))
            .with_output("state", serde_json::json!(state));
        if let Some(verifier) = verifier {
            result = result
                .with_output("pkce_code_verifier", serde_json::json!(verifier.as_str()));
        }
        result
    }
}

/// Exchanges the authorization code for tokens and publishes the
/// credential bundle.
#[derive(Debug)]
pub struct CodeExchangeStage {
    tokens: Arc<dyn TokenEndpoint>,
}

impl CodeExchangeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenEndpoint>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Stage for CodeExchangeStage {
    fn name(&self) -> &str {
        "code_exchange"
    }

    fn required_inputs(&self) -> &[&str] {
        &["code", "client_id", "redirect_uri"]
    }

    fn optional_inputs(&self) -> &[&str] {
        &["client_secret", "pkce_code_verifier"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &[
            "smart_credentials",
            "received_scopes",
            "access_token",
            "refresh_token",
            "id_token",
            "token_retrieval_time",
            "expires_in",
            "patient_id",
        ]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let code = ctx.get_str("code").unwrap_or_default();
        let redirect_uri = ctx.get_str("redirect_uri").unwrap_or_default();
        let credentials = ClientCredentials {
            client_id: ctx.get_str("client_id").unwrap_or_default().to_string(),
            client_secret: ctx.get_str("client_secret").map(ToString::to_string),
        };

        let response = match self
            .tokens
            .exchange(
                code,
                ctx.get_str("pkce_code_verifier"),
                redirect_uri,
                &credentials,
            )
            .await
        {
            Ok(response) => response,
            Err(err) => return transport_error("token exchange", &err),
        };

        if response.access_token.is_empty() {
            return StageResult::fail("token response did not include an access token");
        }
        if !response.token_type.eq_ignore_ascii_case("bearer") {
            return StageResult::fail(format!(
                "token_type must be Bearer, got '{}'",
                response.token_type
            ));
        }

        let retrieved_at = Utc::now();
        let bundle = response.to_bundle(retrieved_at, None, &[]);
        let handle = ctx.store().put(bundle);

        let mut result = StageResult::pass()
            .with_output("smart_credentials", serde_json::json!(handle.to_string()))
            .with_output("access_token", serde_json::json!(response.access_token))
            .with_output(
                "token_retrieval_time",
                serde_json::json!(retrieved_at.to_rfc3339()),
            );
        if let Some(scope) = &response.scope {
            result = result.with_output("received_scopes", serde_json::json!(scope));
        }
        if let Some(refresh_token) = &response.refresh_token {
            result = result.with_output("refresh_token", serde_json::json!(refresh_token));
        }
        if let Some(id_token) = &response.id_token {
            result = result.with_output("id_token", serde_json::json!(id_token));
        }
        if let Some(expires_in) = response.expires_in {
            result = result.with_output("expires_in", serde_json::json!(expires_in));
        }
        if let Some(patient) = &response.patient {
            result = result.with_output("patient_id", serde_json::json!(patient));
        } else {
            result = result
                .with_message("token response did not include a patient launch context");
        }
        result
    }
}
