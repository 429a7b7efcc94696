//! Unauthenticated access probe.

use super::{transport_error, Stage, StageContext};
use crate::collaborators::ResourceAccess;
use crate::core::StageResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Checks that a resource read without credentials is rejected with 401.
#[derive(Debug)]
pub struct UnauthorizedAccessStage {
    resources: Arc<dyn ResourceAccess>,
}

impl UnauthorizedAccessStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(resources: Arc<dyn ResourceAccess>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl Stage for UnauthorizedAccessStage {
    fn name(&self) -> &str {
        "unauthorized_access"
    }

    fn required_inputs(&self) -> &[&str] {
        &["patient_id"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &[]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let patient_id = ctx.get_str("patient_id").unwrap_or_default();

        let outcome = match self.resources.read("Patient", patient_id, None).await {
            Ok(outcome) => outcome,
            Err(err) => return transport_error("unauthenticated patient read", &err),
        };

        match outcome.status {
            401 => StageResult::pass(),
            status if outcome.is_success() => StageResult::fail(format!(
                "server returned {status} and data for a patient read without credentials; expected 401"
            )),
            status => StageResult::fail(format!(
                "expected 401 for a patient read without credentials, got {status}"
            )),
        }
    }
}
