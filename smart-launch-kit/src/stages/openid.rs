//! OpenID Connect identity validation.

use super::{Stage, StageContext};
use crate::core::StageResult;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Decodes the ID token payload and checks the OIDC claims this flow
/// depends on.
///
/// Signature and issuer-key verification are delegated to the host's JWT
/// library; this stage validates the claims the launch contract needs:
/// `iss`, `sub`, `aud`, `exp`, and the SMART `fhirUser` claim.
#[derive(Debug, Default)]
pub struct OpenIdIdentityStage;

impl OpenIdIdentityStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn decode_payload(id_token: &str) -> Result<serde_json::Value, String> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err("ID token is not a three-part JWT".to_string());
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|err| format!("ID token payload is not base64url: {err}"))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| format!("ID token payload is not JSON: {err}"))
}

fn audience_matches(aud: &serde_json::Value, client_id: &str) -> bool {
    match aud {
        serde_json::Value::String(aud) => aud == client_id,
        serde_json::Value::Array(entries) => entries
            .iter()
            .any(|entry| entry.as_str() == Some(client_id)),
        _ => false,
    }
}

#[async_trait]
impl Stage for OpenIdIdentityStage {
    fn name(&self) -> &str {
        "openid_identity"
    }

    fn required_inputs(&self) -> &[&str] {
        &["id_token", "client_id"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &["fhir_user"]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let id_token = ctx.get_str("id_token").unwrap_or_default();
        let client_id = ctx.get_str("client_id").unwrap_or_default();

        let payload = match decode_payload(id_token) {
            Ok(payload) => payload,
            Err(message) => return StageResult::fail(message),
        };

        let mut problems: Vec<String> = Vec::new();

        match payload.get("iss").and_then(serde_json::Value::as_str) {
            Some(iss) if !iss.is_empty() => {}
            _ => problems.push("`iss` claim is missing or empty".to_string()),
        }

        match payload.get("sub").and_then(serde_json::Value::as_str) {
            Some(sub) if !sub.is_empty() && sub.len() <= 255 => {}
            Some(_) => problems.push("`sub` claim must be 1-255 characters".to_string()),
            None => problems.push("`sub` claim is missing".to_string()),
        }

        match payload.get("aud") {
            Some(aud) if audience_matches(aud, client_id) => {}
            Some(_) => problems.push(format!(
                "`aud` claim does not include the client id '{client_id}'"
            )),
            None => problems.push("`aud` claim is missing".to_string()),
        }

        if payload.get("exp").and_then(serde_json::Value::as_i64).is_none() {
            problems.push("`exp` claim is missing or not numeric".to_string());
        }

        let fhir_user = payload
            .get("fhirUser")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);
        if fhir_user.is_none() {
            problems.push("`fhirUser` claim is missing".to_string());
        }

        if !problems.is_empty() {
            return StageResult::fail(problems.join("; "));
        }

        // fhir_user is present when problems is empty.
        let mut result = StageResult::pass();
        if let Some(fhir_user) = fhir_user {
            result = result.with_output("fhir_user", serde_json::json!(fhir_user));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::RunToken;
    use crate::core::StageStatus;
    use crate::credentials::CredentialStore;
    use crate::testing::unsigned_id_token;
    use base64::Engine as _;
    use std::collections::HashMap;

    async fn run_stage(id_token: &str, client_id: &str) -> StageResult {
        let stage = OpenIdIdentityStage::new();
        let store = CredentialStore::new();
        let token = RunToken::new();
        let mut inputs = HashMap::new();
        inputs.insert("id_token".to_string(), serde_json::json!(id_token));
        inputs.insert("client_id".to_string(), serde_json::json!(client_id));
        let ctx = StageContext::new(inputs, &store, &token, "openid/openid_identity");
        stage.run(&ctx).await
    }

    #[tokio::test]
    async fn test_valid_id_token_passes_and_exposes_fhir_user() {
        let id_token =
            unsigned_id_token("https://auth.example.com", "demo-app", "Patient/85");
        let result = run_stage(&id_token, "demo-app").await;

        assert_eq!(result.status, StageStatus::Pass);
        assert_eq!(result.get("fhir_user"), Some(&serde_json::json!("Patient/85")));
    }

    #[tokio::test]
    async fn test_malformed_token_fails() {
        let result = run_stage("only-one-part", "demo-app").await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("three-part"));
    }

    #[tokio::test]
    async fn test_wrong_audience_fails() {
        let id_token =
            unsigned_id_token("https://auth.example.com", "other-client", "Patient/85");
        let result = run_stage(&id_token, "demo-app").await;

        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("aud"));
    }

    #[tokio::test]
    async fn test_missing_fhir_user_fails() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({
                "iss": "https://auth.example.com",
                "sub": "user-1",
                "aud": "demo-app",
                "exp": 2_000_000_000,
            })
            .to_string(),
        );
        let id_token = format!("{header}.{payload}.sig");

        let result = run_stage(&id_token, "demo-app").await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("fhirUser"));
    }

    #[tokio::test]
    async fn test_audience_array_accepted() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({
                "iss": "https://auth.example.com",
                "sub": "user-1",
                "aud": ["demo-app", "other"],
                "exp": 2_000_000_000,
                "fhirUser": "Practitioner/9",
            })
            .to_string(),
        );
        let id_token = format!("{header}.{payload}.sig");

        let result = run_stage(&id_token, "demo-app").await;
        assert_eq!(result.status, StageStatus::Pass);
    }
}
