//! Suite-level credential export.

use super::{Stage, StageContext};
use crate::core::StageResult;
use async_trait::async_trait;

/// Republishes the standalone launch credentials and patient id under the
/// suite-level names the host reads at exit.
#[derive(Debug, Default)]
pub struct CredentialsExportStage;

impl CredentialsExportStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for CredentialsExportStage {
    fn name(&self) -> &str {
        "credentials_export"
    }

    fn required_inputs(&self) -> &[&str] {
        &["standalone_smart_credentials", "standalone_patient_id"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &["smart_credentials", "patient_id"]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let mut result = StageResult::pass();
        if let Some(credentials) = ctx.get("standalone_smart_credentials") {
            result = result.with_output("smart_credentials", credentials.clone());
        }
        if let Some(patient_id) = ctx.get("standalone_patient_id") {
            result = result.with_output("patient_id", patient_id.clone());
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
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_export_republishes_under_suite_names() {
        let stage = CredentialsExportStage::new();
        let store = CredentialStore::new();
        let token = RunToken::new();

        let mut inputs = HashMap::new();
        inputs.insert(
            "standalone_smart_credentials".to_string(),
            serde_json::json!("handle-1"),
        );
        inputs.insert(
            "standalone_patient_id".to_string(),
            serde_json::json!("85"),
        );
        let ctx = StageContext::new(inputs, &store, &token, "credentials_export");

        let result = stage.run(&ctx).await;
        assert_eq!(result.status, StageStatus::Pass);
        assert_eq!(
            result.get("smart_credentials"),
            Some(&serde_json::json!("handle-1"))
        );
        assert_eq!(result.get("patient_id"), Some(&serde_json::json!("85")));
    }
}
