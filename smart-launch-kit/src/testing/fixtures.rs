//! Canned protocol payloads for tests.

use crate::collaborators::TokenResponse;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};

/// Builds an unsigned (test-only) ID token with the standard OIDC claims
/// and a `fhirUser` claim.
///
/// Signature verification is the host's concern; the identity stage only
/// inspects the payload.
#[must_use]
pub fn unsigned_id_token(issuer: &str, client_id: &str, fhir_user: &str) -> String {
    let header = serde_json::json!({"alg": "RS256", "typ": "JWT"});
    let now = Utc::now();
    let payload = serde_json::json!({
        "iss": issuer,
        "sub": "user-123",
        "aud": client_id,
        "iat": now.timestamp(),
        "exp": (now + Duration::minutes(5)).timestamp(),
        "fhirUser": fhir_user,
    });
    let sign = |value: &serde_json::Value| URL_SAFE_NO_PAD.encode(value.to_string());
    format!("{}.{}.{}", sign(&header), sign(&payload), URL_SAFE_NO_PAD.encode("sig"))
}

/// Builds a complete token response for a patient standalone launch.
#[must_use]
pub fn uscdi_token_response(patient_id: &str, scope: &str, id_token: Option<String>) -> TokenResponse {
    TokenResponse {
        access_token: "access-token-1".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: Some(3600),
        scope: Some(scope.to_string()),
        refresh_token: Some("refresh-token-1".to_string()),
        id_token,
        patient: Some(patient_id.to_string()),
    }
}
