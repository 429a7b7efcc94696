//! Scope grant conformance evaluation.

use super::grammar::{Compartment, ScopeError, ScopeRequest, ScopeToken};
use serde::{Deserialize, Serialize};

/// The outcome of comparing granted scopes against the required subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeGrantResult {
    /// True iff every required scope is covered by a granted scope under
    /// the version's matching rule.
    pub satisfied: bool,
    /// Required scopes with no covering grant.
    pub missing: Vec<String>,
    /// Granted scopes that cover nothing requested, plus grants that do
    /// not parse under the version grammar. Informational only.
    pub unexpected: Vec<String>,
    /// The compartment the flow requires for resource access.
    pub context_type: Compartment,
}

impl ScopeGrantResult {
    /// Renders the missing set as a diagnostic fragment.
    #[must_use]
    pub fn missing_list(&self) -> String {
        self.missing.join(", ")
    }
}

/// Compares a granted-scope set against the required subset of a request.
///
/// Both the requested scopes and `required_subset` must parse under the
/// request's grammar version; a parse failure there is a configuration
/// error, not a server violation. Granted strings are parsed leniently:
/// a grant that does not parse under the version grammar (including a
/// grant in the other version's syntax) can satisfy nothing and is
/// reported in `unexpected`.
pub fn evaluate(
    requested: &ScopeRequest,
    granted: &[String],
    required_subset: &[String],
    context_type: Compartment,
) -> Result<ScopeGrantResult, ScopeError> {
    let version = requested.version();

    let required: Vec<(String, ScopeToken)> = required_subset
        .iter()
        .map(|raw| ScopeToken::parse(raw, version).map(|token| (raw.clone(), token)))
        .collect::<Result<_, _>>()?;

    let mut granted_tokens: Vec<(String, ScopeToken)> = Vec::new();
    let mut unexpected: Vec<String> = Vec::new();
    for raw in granted {
        match ScopeToken::parse(raw, version) {
            Ok(token) => granted_tokens.push((raw.clone(), token)),
            Err(_) => unexpected.push(raw.clone()),
        }
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|(_, token)| {
            !granted_tokens
                .iter()
                .any(|(_, grant)| token.satisfied_by(grant))
        })
        .map(|(raw, _)| raw.clone())
        .collect();

    for (raw, grant) in &granted_tokens {
        let covers_any_request = requested
            .tokens()
            .iter()
            .any(|requested_token| requested_token.satisfied_by(grant));
        if !covers_any_request {
            unexpected.push(raw.clone());
        }
    }

    Ok(ScopeGrantResult {
        satisfied: missing.is_empty(),
        missing,
        unexpected,
        context_type,
    })
}
