//! Well-known capability conformance check.

use super::{transport_error, Stage, StageContext};
use crate::collaborators::CapabilityDiscovery;
use crate::core::StageResult;
use crate::flow::FlowVariant;
use async_trait::async_trait;
use std::sync::Arc;

/// Checks that the server's discovery document advertises every
/// capability the selected protocol version requires.
#[derive(Debug)]
pub struct WellKnownCapabilitiesStage {
    discovery: Arc<dyn CapabilityDiscovery>,
    variant: FlowVariant,
}

impl WellKnownCapabilitiesStage {
    /// Creates the stage for a protocol version.
    #[must_use]
    pub fn new(discovery: Arc<dyn CapabilityDiscovery>, variant: FlowVariant) -> Self {
        Self { discovery, variant }
    }
}

#[async_trait]
impl Stage for WellKnownCapabilitiesStage {
    fn name(&self) -> &str {
        "well_known_capabilities"
    }

    fn required_inputs(&self) -> &[&str] {
        &[]
    }

    fn produced_outputs(&self) -> &[&str] {
        &["capabilities"]
    }

    async fn run(&self, _ctx: &StageContext<'_>) -> StageResult {
        let capabilities = match self.discovery.fetch_capabilities(self.variant).await {
            Ok(capabilities) => capabilities,
            Err(err) => return transport_error("capability discovery", &err),
        };

        let mut missing: Vec<&str> = self
            .variant
            .required_capabilities()
            .iter()
            .copied()
            .filter(|required| !capabilities.contains(*required))
            .collect();
        missing.sort_unstable();

        let mut advertised: Vec<String> = capabilities.into_iter().collect();
        advertised.sort_unstable();

        if missing.is_empty() {
            StageResult::pass().with_output("capabilities", serde_json::json!(advertised))
        } else {
            StageResult::fail(format!(
                "server does not advertise required capabilities: {}",
                missing.join(", ")
            ))
            .with_output("capabilities", serde_json::json!(advertised))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::RunToken;
    use crate::collaborators::CollaboratorError;
    use crate::core::StageStatus;
    use crate::credentials::CredentialStore;
    use crate::testing::MockDiscovery;
    use std::collections::HashMap;

    async fn run_stage(stage: &WellKnownCapabilitiesStage) -> StageResult {
        let store = CredentialStore::new();
        let token = RunToken::new();
        let ctx = StageContext::new(HashMap::new(), &store, &token, "discovery");
        stage.run(&ctx).await
    }

    #[tokio::test]
    async fn test_all_stu1_capabilities_pass() {
        let discovery = Arc::new(MockDiscovery::with_capabilities(
            FlowVariant::Stu1.required_capabilities(),
        ));
        let stage = WellKnownCapabilitiesStage::new(discovery, FlowVariant::Stu1);

        let result = run_stage(&stage).await;
        assert_eq!(result.status, StageStatus::Pass);
    }

    #[tokio::test]
    async fn test_missing_capability_fails_and_is_named() {
        let capabilities: Vec<&str> = FlowVariant::Stu1
            .required_capabilities()
            .iter()
            .copied()
            .filter(|c| *c != "permission-offline")
            .collect();
        let discovery = Arc::new(MockDiscovery::with_capabilities(&capabilities));
        let stage = WellKnownCapabilitiesStage::new(discovery, FlowVariant::Stu1);

        let result = run_stage(&stage).await;
        assert_eq!(result.status, StageStatus::Fail);
        assert!(result.message.unwrap().contains("permission-offline"));
    }

    #[tokio::test]
    async fn test_stu1_set_is_not_enough_for_stu2() {
        let discovery = Arc::new(MockDiscovery::with_capabilities(
            FlowVariant::Stu1.required_capabilities(),
        ));
        let stage = WellKnownCapabilitiesStage::new(discovery, FlowVariant::Stu2);

        let result = run_stage(&stage).await;
        assert_eq!(result.status, StageStatus::Fail);
        let message = result.message.unwrap();
        for capability in ["authorize-post", "permission-v1", "permission-v2"] {
            assert!(message.contains(capability), "missing {capability}");
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_error_not_fail() {
        let discovery = Arc::new(MockDiscovery::failing(CollaboratorError::Timeout));
        let stage = WellKnownCapabilitiesStage::new(discovery, FlowVariant::Stu1);

        let result = run_stage(&stage).await;
        assert_eq!(result.status, StageStatus::Error);
    }
}
