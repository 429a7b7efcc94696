//! Patient context validation.

use super::{transport_error, Stage, StageContext};
use crate::collaborators::ResourceAccess;
use crate::core::StageResult;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Reads the patient in context with the current credential bundle and
/// checks the returned resource matches.
///
/// The same check runs twice in a standalone launch: once after the
/// initial token exchange and once after refresh, with the `refresh_test`
/// marker distinguishing the diagnostics.
#[derive(Debug)]
pub struct PatientContextStage {
    resources: Arc<dyn ResourceAccess>,
    refresh_test: bool,
}

impl PatientContextStage {
    /// Creates the initial context check.
    #[must_use]
    pub fn new(resources: Arc<dyn ResourceAccess>) -> Self {
        Self {
            resources,
            refresh_test: false,
        }
    }

    /// Creates the post-refresh context check.
    #[must_use]
    pub fn refresh_test(resources: Arc<dyn ResourceAccess>) -> Self {
        Self {
            resources,
            refresh_test: true,
        }
    }

    fn label(&self) -> &'static str {
        if self.refresh_test {
            "post-refresh patient context"
        } else {
            "patient context"
        }
    }
}

#[async_trait]
impl Stage for PatientContextStage {
    fn name(&self) -> &str {
        if self.refresh_test {
            "patient_context_after_refresh"
        } else {
            "patient_context"
        }
    }

    fn required_inputs(&self) -> &[&str] {
        &["patient_id", "smart_credentials"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &[]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let patient_id = ctx.get_str("patient_id").unwrap_or_default();
        let Some(bundle) = ctx.bundle("smart_credentials") else {
            return StageResult::error(
                "smart_credentials does not resolve to a stored credential bundle",
            );
        };

        if bundle.is_expired_at(Utc::now()) {
            return StageResult::fail(format!(
                "{}: access token expired before the patient read",
                self.label()
            ));
        }

        let outcome = match self
            .resources
            .read("Patient", patient_id, Some(&bundle.access_token))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return transport_error(self.label(), &err),
        };

        if !outcome.is_success() {
            return StageResult::fail(format!(
                "{}: patient read returned {}",
                self.label(),
                outcome.status
            ));
        }

        let Some(resource) = outcome.resource else {
            return StageResult::fail(format!(
                "{}: patient read returned no resource body",
                self.label()
            ));
        };
        if resource.get("resourceType").and_then(serde_json::Value::as_str)
            != Some("Patient")
        {
            return StageResult::fail(format!(
                "{}: expected a Patient resource",
                self.label()
            ));
        }
        if resource.get("id").and_then(serde_json::Value::as_str) != Some(patient_id) {
            return StageResult::fail(format!(
                "{}: returned patient id does not match the launch context '{patient_id}'",
                self.label()
            ));
        }

        StageResult::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::RunToken;
    use crate::collaborators::ResourceOutcome;
    use crate::core::StageStatus;
    use crate::credentials::{CredentialBundle, CredentialStore};
    use crate::testing::MockResourceAccess;
    use std::collections::HashMap;

    fn bundle(access_token: &str) -> CredentialBundle {
        CredentialBundle {
            access_token: access_token.to_string(),
            refresh_token: None,
            id_token: None,
            token_type: "Bearer".to_string(),
            scopes: vec!["launch/patient".to_string()],
            expires_at: None,
            retrieved_at: Utc::now(),
        }
    }

    async fn run_stage(
        stage: &PatientContextStage,
        store: &CredentialStore,
        handle: &str,
    ) -> StageResult {
        let token = RunToken::new();
        let mut inputs = HashMap::new();
        inputs.insert("patient_id".to_string(), serde_json::json!("85"));
        inputs.insert("smart_credentials".to_string(), serde_json::json!(handle));
        let ctx = StageContext::new(inputs, store, &token, "launch/patient_context");
        stage.run(&ctx).await
    }

    #[tokio::test]
    async fn test_matching_patient_passes() {
        let resources = Arc::new(MockResourceAccess::new());
        let stage = PatientContextStage::new(resources.clone());
        let store = CredentialStore::new();
        let handle = store.put(bundle("at-1")).to_string();

        let result = run_stage(&stage, &store, &handle).await;
        assert_eq!(result.status, StageStatus::Pass);
        assert_eq!(resources.reads()[0].access_token.as_deref(), Some("at-1"));
    }

    #[tokio::test]
    async fn test_denied_read_fails() {
        let resources = Arc::new(MockResourceAccess::new().respond_with(
            "Patient",
            ResourceOutcome {
                status: 403,
                resource: None,
            },
        ));
        let stage = PatientContextStage::new(resources);
        let store = CredentialStore::new();
        let handle = store.put(bundle("at-1")).to_string();

        let result = run_stage(&stage, &store, &handle).await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_wrong_patient_id_fails() {
        let resources = Arc::new(MockResourceAccess::new().respond_with(
            "Patient",
            ResourceOutcome {
                status: 200,
                resource: Some(serde_json::json!({"resourceType": "Patient", "id": "86"})),
            },
        ));
        let stage = PatientContextStage::new(resources);
        let store = CredentialStore::new();
        let handle = store.put(bundle("at-1")).to_string();

        let result = run_stage(&stage, &store, &handle).await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("does not match"));
    }

    #[tokio::test]
    async fn test_expired_token_fails_before_read() {
        let resources = Arc::new(MockResourceAccess::new());
        let stage = PatientContextStage::new(resources.clone());
        let store = CredentialStore::new();
        let mut expired = bundle("at-1");
        expired.expires_at = Some(Utc::now() - chrono::Duration::seconds(10));
        let handle = store.put(expired).to_string();

        let result = run_stage(&stage, &store, &handle).await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(resources.reads().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_marker_changes_name_and_diagnostics() {
        let resources = Arc::new(MockResourceAccess::new().respond_with(
            "Patient",
            ResourceOutcome {
                status: 401,
                resource: None,
            },
        ));
        let stage = PatientContextStage::refresh_test(resources);
        assert_eq!(stage.name(), "patient_context_after_refresh");

        let store = CredentialStore::new();
        let handle = store.put(bundle("at-2")).to_string();
        let result = run_stage(&stage, &store, &handle).await;

        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().starts_with("post-refresh"));
    }

    #[tokio::test]
    async fn test_unresolvable_handle_is_configuration_error() {
        let stage = PatientContextStage::new(Arc::new(MockResourceAccess::new()));
        let store = CredentialStore::new();

        let result = run_stage(&stage, &store, "not-a-handle").await;
        assert_eq!(result.status, StageStatus::Error);
    }
}
