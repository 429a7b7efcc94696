//! Token refresh sub-flow stage.

use super::{transport_error, Stage, StageContext};
use crate::collaborators::{ClientCredentials, TokenEndpoint};
use crate::core::StageResult;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Exchanges the refresh token for a new access token and publishes a
/// fresh credential bundle.
///
/// A refresh response without a new refresh token reuses the prior one:
/// single-use and reusable refresh tokens are both conformant.
#[derive(Debug)]
pub struct TokenRefreshStage {
    tokens: Arc<dyn TokenEndpoint>,
}

impl TokenRefreshStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenEndpoint>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Stage for TokenRefreshStage {
    fn name(&self) -> &str {
        "token_refresh"
    }

    fn required_inputs(&self) -> &[&str] {
        &["refresh_token", "client_id", "received_scopes"]
    }

    fn optional_inputs(&self) -> &[&str] {
        &["client_secret"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &[
            "smart_credentials",
            "received_scopes",
            "refresh_token",
            "access_token",
            "token_retrieval_time",
            "expires_in",
        ]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let refresh_token = ctx.get_str("refresh_token").unwrap_or_default();
        let prior_scopes: Vec<String> = ctx
            .get_str("received_scopes")
            .unwrap_or_default()
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
        let credentials = ClientCredentials {
            client_id: ctx.get_str("client_id").unwrap_or_default().to_string(),
            client_secret: ctx.get_str("client_secret").map(ToString::to_string),
        };

        let response = match self
            .tokens
            .refresh(refresh_token, &credentials, None)
            .await
        {
            Ok(response) => response,
            Err(err) => return transport_error("token refresh", &err),
        };

        let mut problems: Vec<String> = Vec::new();
        if response.access_token.is_empty() {
            problems.push("refresh response did not include an access token".to_string());
        }
        if !response.token_type.eq_ignore_ascii_case("bearer") {
            problems.push(format!(
                "token_type must be Bearer, got '{}'",
                response.token_type
            ));
        }
        if response.expires_in.is_none() {
            problems.push("refresh response did not include expires_in".to_string());
        }
        if !problems.is_empty() {
            return StageResult::fail(problems.join("; "));
        }

        let retrieved_at = Utc::now();
        let bundle = response.to_bundle(retrieved_at, Some(refresh_token), &prior_scopes);
        let scope_string = bundle.scope_string();
        let new_refresh_token = bundle.refresh_token.clone();
        let handle = ctx.store().put(bundle);

        let mut result = StageResult::pass()
            .with_output("smart_credentials", serde_json::json!(handle.to_string()))
            .with_output("received_scopes", serde_json::json!(scope_string))
            .with_output("access_token", serde_json::json!(response.access_token))
            .with_output(
                "token_retrieval_time",
                serde_json::json!(retrieved_at.to_rfc3339()),
            );
        if let Some(refresh_token) = new_refresh_token {
            result = result.with_output("refresh_token", serde_json::json!(refresh_token));
        }
        if let Some(expires_in) = response.expires_in {
            result = result.with_output("expires_in", serde_json::json!(expires_in));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::RunToken;
    use crate::collaborators::{CollaboratorError, TokenResponse};
    use crate::core::StageStatus;
    use crate::credentials::{CredentialHandle, CredentialStore};
    use crate::testing::MockTokenEndpoint;
    use std::collections::HashMap;

    fn refresh_inputs() -> HashMap<String, serde_json::Value> {
        let mut inputs = HashMap::new();
        inputs.insert("refresh_token".to_string(), serde_json::json!("r1"));
        inputs.insert("client_id".to_string(), serde_json::json!("demo-app"));
        inputs.insert("client_secret".to_string(), serde_json::json!("hunter2"));
        inputs.insert(
            "received_scopes".to_string(),
            serde_json::json!("openid launch/patient patient/Patient.read"),
        );
        inputs
    }

    fn refresh_response() -> TokenResponse {
        TokenResponse {
            access_token: "at-2".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            ..TokenResponse::default()
        }
    }

    async fn run_stage(
        tokens: Arc<MockTokenEndpoint>,
        store: &CredentialStore,
    ) -> StageResult {
        let stage = TokenRefreshStage::new(tokens);
        let token = RunToken::new();
        let ctx = StageContext::new(refresh_inputs(), store, &token, "refresh/token_refresh");
        stage.run(&ctx).await
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_reuses_prior_token() {
        let tokens = Arc::new(MockTokenEndpoint::new().with_refresh(refresh_response()));
        let store = CredentialStore::new();

        let result = run_stage(tokens, &store).await;
        assert_eq!(result.status, StageStatus::Pass);
        assert_eq!(result.get("refresh_token"), Some(&serde_json::json!("r1")));

        let handle: CredentialHandle = result
            .get("smart_credentials")
            .unwrap()
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let bundle = store.get(handle).unwrap();
        assert_eq!(bundle.refresh_token.as_deref(), Some("r1"));
        // Prior scopes carry forward when the response omits scope.
        assert_eq!(
            result.get("received_scopes"),
            Some(&serde_json::json!("openid launch/patient patient/Patient.read"))
        );
    }

    #[tokio::test]
    async fn test_refresh_with_rotation_uses_new_token() {
        let mut response = refresh_response();
        response.refresh_token = Some("r2".to_string());
        let tokens = Arc::new(MockTokenEndpoint::new().with_refresh(response));
        let store = CredentialStore::new();

        let result = run_stage(tokens, &store).await;
        assert_eq!(result.get("refresh_token"), Some(&serde_json::json!("r2")));
    }

    #[tokio::test]
    async fn test_refresh_missing_expires_in_fails() {
        let mut response = refresh_response();
        response.expires_in = None;
        let tokens = Arc::new(MockTokenEndpoint::new().with_refresh(response));
        let store = CredentialStore::new();

        let result = run_stage(tokens, &store).await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("expires_in"));
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_is_error() {
        let tokens = Arc::new(
            MockTokenEndpoint::new().with_refresh_error(CollaboratorError::Timeout),
        );
        let store = CredentialStore::new();

        let result = run_stage(tokens, &store).await;
        assert_eq!(result.status, StageStatus::Error);
        assert!(store.is_empty(), "no bundle published on failure");
    }

    #[tokio::test]
    async fn test_refresh_presents_the_prior_refresh_token() {
        let tokens = Arc::new(MockTokenEndpoint::new().with_refresh(refresh_response()));
        let store = CredentialStore::new();

        run_stage(tokens.clone(), &store).await;
        assert_eq!(tokens.refresh_calls()[0].refresh_token, "r1");
    }
}
