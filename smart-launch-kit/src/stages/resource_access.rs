//! Unrestricted resource type access sweep.

use super::{transport_error, Stage, StageContext};
use crate::collaborators::ResourceAccess;
use crate::core::StageResult;
use crate::scopes::{
    Access, Compartment, Cruds, ResourceSelector, ScopeToken, ScopeVersion, V1Access,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Confirms that every expected resource type is both granted by the
/// received scopes and actually readable with the access token.
#[derive(Debug)]
pub struct UnrestrictedResourceAccessStage {
    resources: Arc<dyn ResourceAccess>,
    resource_types: Vec<String>,
    version: ScopeVersion,
}

impl UnrestrictedResourceAccessStage {
    /// Creates the stage over the expected resource types.
    #[must_use]
    pub fn new(
        resources: Arc<dyn ResourceAccess>,
        resource_types: Vec<String>,
        version: ScopeVersion,
    ) -> Self {
        Self {
            resources,
            resource_types,
            version,
        }
    }

    fn grants_read(&self, granted: &[ScopeToken], resource_type: &str) -> bool {
        let required_access = match self.version {
            ScopeVersion::V1 => Access::V1(V1Access::Read),
            ScopeVersion::V2 => Access::V2(Cruds {
                read: true,
                ..Cruds::default()
            }),
        };
        let required_resource = ResourceSelector::Type(resource_type.to_string());
        granted.iter().any(|token| {
            let ScopeToken::Resource(scope) = token else {
                return false;
            };
            scope.compartment == Compartment::Patient
                && scope.resource.covers(&required_resource)
                && scope.access.grants(&required_access)
        })
    }
}

#[async_trait]
impl Stage for UnrestrictedResourceAccessStage {
    fn name(&self) -> &str {
        "unrestricted_resource_type_access"
    }

    fn required_inputs(&self) -> &[&str] {
        &["received_scopes", "patient_id", "smart_credentials"]
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

        // Grants that do not parse under the run's grammar cannot grant
        // access; the scope stage already reported them.
        let granted: Vec<ScopeToken> = ctx
            .get_str("received_scopes")
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(|raw| ScopeToken::parse(raw, self.version).ok())
            .collect();

        let mut ungranted: Vec<&str> = Vec::new();
        let mut denied: Vec<String> = Vec::new();

        for resource_type in &self.resource_types {
            if !self.grants_read(&granted, resource_type) {
                ungranted.push(resource_type);
                continue;
            }

            let outcome = match self
                .resources
                .read(resource_type, patient_id, Some(&bundle.access_token))
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    return transport_error(
                        &format!("{resource_type} access check"),
                        &err,
                    )
                }
            };
            if !outcome.is_success() {
                denied.push(format!("{resource_type} ({})", outcome.status));
            }
        }

        if ungranted.is_empty() && denied.is_empty() {
            return StageResult::pass();
        }

        let mut problems: Vec<String> = Vec::new();
        if !ungranted.is_empty() {
            problems.push(format!(
                "received scopes do not grant patient-level read access to: {}",
                ungranted
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !denied.is_empty() {
            problems.push(format!("access denied for: {}", denied.join(", ")));
        }
        StageResult::fail(problems.join("; "))
    }
}
