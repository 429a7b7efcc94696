//! Scope grant conformance stage.

use super::{Stage, StageContext};
use crate::core::StageResult;
use crate::scopes::{evaluate, Compartment, ScopeRequest, ScopeToken, ScopeVersion};
use async_trait::async_trait;

/// Checks that the granted scopes cover the required subset under the
/// run's scope grammar.
#[derive(Debug)]
pub struct ScopeGrantStage {
    version: ScopeVersion,
    required_subset: Vec<String>,
    context_type: Compartment,
}

impl ScopeGrantStage {
    /// Creates the stage with a required subset and compartment.
    #[must_use]
    pub fn new(
        version: ScopeVersion,
        required_subset: Vec<String>,
        context_type: Compartment,
    ) -> Self {
        Self {
            version,
            required_subset,
            context_type,
        }
    }
}

#[async_trait]
impl Stage for ScopeGrantStage {
    fn name(&self) -> &str {
        "scope_grant"
    }

    fn required_inputs(&self) -> &[&str] {
        &["requested_scopes", "received_scopes"]
    }

    fn produced_outputs(&self) -> &[&str] {
        &[]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let raw_requested = ctx.get_str("requested_scopes").unwrap_or_default();
        let requested = match ScopeRequest::parse(raw_requested, self.version) {
            Ok(requested) => requested,
            Err(err) => {
                return StageResult::error(format!(
                    "requested scopes are not valid {} syntax: {err}",
                    self.version
                ))
            }
        };

        // A requested-scope string that leaves out the required subset is
        // a tester misconfiguration, not a server violation.
        for required in &self.required_subset {
            let token = match ScopeToken::parse(required, self.version) {
                Ok(token) => token,
                Err(err) => {
                    return StageResult::error(format!(
                        "required scope '{required}' is not valid {} syntax: {err}",
                        self.version
                    ))
                }
            };
            if !requested.tokens().iter().any(|t| token.satisfied_by(t)) {
                return StageResult::error(format!(
                    "requested scopes must include '{required}'"
                ));
            }
        }

        let granted: Vec<String> = ctx
            .get_str("received_scopes")
            .unwrap_or_default()
            .split_whitespace()
            .map(ToString::to_string)
            .collect();

        let result = match evaluate(&requested, &granted, &self.required_subset, self.context_type)
        {
            Ok(result) => result,
            Err(err) => return StageResult::error(err.to_string()),
        };

        if result.satisfied {
            StageResult::pass()
        } else {
            StageResult::fail(format!(
                "missing required scope(s): {}",
                result.missing_list()
            ))
        }
    }
}
