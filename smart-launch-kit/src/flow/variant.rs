//! Protocol version selection.

use crate::scopes::ScopeVersion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The USCDI resource types a full-access patient launch must reach.
pub const USCDI_RESOURCE_TYPES: &[&str] = &[
    "Medication",
    "AllergyIntolerance",
    "CarePlan",
    "CareTeam",
    "Condition",
    "Device",
    "DiagnosticReport",
    "DocumentReference",
    "Encounter",
    "Goal",
    "Immunization",
    "Location",
    "MedicationRequest",
    "Observation",
    "Organization",
    "Patient",
    "Practitioner",
    "Procedure",
    "Provenance",
    "PractitionerRole",
];

/// The scopes every standalone patient launch must be granted.
pub const REQUIRED_CONTEXT_SCOPES: &[&str] =
    &["openid", "fhirUser", "launch/patient", "offline_access"];

const STU1_CAPABILITIES: &[&str] = &[
    "launch-standalone",
    "client-public",
    "client-confidential-symmetric",
    "sso-openid-connect",
    "context-standalone-patient",
    "permission-offline",
    "permission-patient",
];

const STU2_CAPABILITIES: &[&str] = &[
    "launch-standalone",
    "client-public",
    "client-confidential-symmetric",
    "sso-openid-connect",
    "context-standalone-patient",
    "permission-offline",
    "permission-patient",
    "authorize-post",
    "permission-v1",
    "permission-v2",
];

/// The SMART App Launch version under test, fixed for a run's lifetime.
///
/// The variant selects the required capability set checked during
/// discovery and the scope grammar used everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowVariant {
    /// SMART App Launch STU1.
    Stu1,
    /// SMART App Launch STU2.
    Stu2,
}

impl FlowVariant {
    /// The scope grammar this version uses.
    #[must_use]
    pub fn scope_version(self) -> ScopeVersion {
        match self {
            Self::Stu1 => ScopeVersion::V1,
            Self::Stu2 => ScopeVersion::V2,
        }
    }

    /// The capabilities the server's discovery document must advertise.
    #[must_use]
    pub fn required_capabilities(self) -> &'static [&'static str] {
        match self {
            Self::Stu1 => STU1_CAPABILITIES,
            Self::Stu2 => STU2_CAPABILITIES,
        }
    }

    /// The default requested-scope string for a full-access patient
    /// launch: the launch-context scopes plus a patient-level read scope
    /// for every USCDI resource type, in the version's grammar.
    #[must_use]
    pub fn default_requested_scopes(self) -> String {
        let suffix = match self {
            Self::Stu1 => "read",
            Self::Stu2 => "rs",
        };
        let mut scopes = vec!["launch/patient openid fhirUser offline_access".to_string()];
        scopes.extend(
            USCDI_RESOURCE_TYPES
                .iter()
                .map(|resource| format!("patient/{resource}.{suffix}")),
        );
        scopes.join(" ")
    }
}

impl fmt::Display for FlowVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stu1 => write!(f, "stu1"),
            Self::Stu2 => write!(f, "stu2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::{ScopeRequest, ScopeVersion};

    #[test]
    fn test_stu1_has_seven_required_capabilities() {
        assert_eq!(FlowVariant::Stu1.required_capabilities().len(), 7);
    }

    #[test]
    fn test_stu2_capabilities_are_a_superset() {
        let stu1 = FlowVariant::Stu1.required_capabilities();
        let stu2 = FlowVariant::Stu2.required_capabilities();
        assert!(stu1.iter().all(|c| stu2.contains(c)));
        for added in ["authorize-post", "permission-v1", "permission-v2"] {
            assert!(stu2.contains(&added));
            assert!(!stu1.contains(&added));
        }
    }

    #[test]
    fn test_default_scopes_parse_under_their_own_grammar() {
        for (variant, version) in [
            (FlowVariant::Stu1, ScopeVersion::V1),
            (FlowVariant::Stu2, ScopeVersion::V2),
        ] {
            let scopes = variant.default_requested_scopes();
            let request = ScopeRequest::parse(&scopes, version).unwrap();
            // Four context scopes plus one per USCDI resource type.
            assert_eq!(request.tokens().len(), 4 + USCDI_RESOURCE_TYPES.len());
        }
    }

    #[test]
    fn test_default_scopes_use_version_suffix() {
        assert!(FlowVariant::Stu1
            .default_requested_scopes()
            .contains("patient/Patient.read"));
        assert!(FlowVariant::Stu2
            .default_requested_scopes()
            .contains("patient/Patient.rs"));
    }
}
