//! Versioned scope token parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors that can occur during scope parsing.
#[derive(Debug, Clone, Error)]
pub enum ScopeError {
    /// The scope string is empty.
    #[error("Empty scope string")]
    Empty,

    /// The compartment prefix is not `patient`, `user`, or `system`.
    #[error("Invalid compartment: {0}")]
    InvalidCompartment(String),

    /// The resource segment is not a FHIR resource type or `*`.
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    /// The scope has no `.permission` suffix.
    #[error("Missing access suffix in scope: {0}")]
    MissingAccess(String),

    /// The access suffix is not valid under the selected grammar.
    #[error("Access suffix '{suffix}' is not valid {version} syntax")]
    InvalidAccess {
        /// The offending suffix.
        suffix: String,
        /// The grammar in effect.
        version: ScopeVersion,
    },

    /// An invalid permission character was encountered.
    #[error("Invalid permission character: {0}")]
    InvalidPermission(char),

    /// Permissions are not in the required order (c < r < u < d < s).
    #[error("Permissions must be in order: c < r < u < d < s")]
    InvalidPermissionOrder,

    /// A search filter is not allowed under the selected grammar.
    #[error("Scope filters are not valid {0} syntax")]
    FilterNotAllowed(ScopeVersion),
}

/// The scope grammar version, fixed per run by the flow variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeVersion {
    /// STU1 syntax: `read`, `write`, or `*` suffixes.
    V1,
    /// STU2 syntax: ordered CRUDS permission letters.
    V2,
}

impl fmt::Display for ScopeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

/// The compartment in which a resource scope applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compartment {
    /// Access limited to the launch patient's data (`patient/*`).
    Patient,
    /// Access based on the authenticated user's permissions (`user/*`).
    User,
    /// Backend service access without a user context (`system/*`).
    System,
}

impl Compartment {
    /// Returns the string form used in scope strings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The resource segment of a compartment scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceSelector {
    /// A specific FHIR resource type (e.g. `Patient`, `Observation`).
    Type(String),
    /// Wildcard (`*`) matching all resource types.
    Wildcard,
}

impl ResourceSelector {
    /// Returns true if a grant of `self` covers a requirement of `other`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Wildcard, _) => true,
            (Self::Type(_), Self::Wildcard) => false,
            (Self::Type(a), Self::Type(b)) => a == b,
        }
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => write!(f, "{t}"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// STU1 access suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum V1Access {
    /// `.read`
    Read,
    /// `.write`
    Write,
    /// `.*` (read and write)
    Wildcard,
}

impl V1Access {
    /// Returns true if a grant of `self` covers a requirement of `required`.
    #[must_use]
    pub fn grants(&self, required: Self) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Read => required == Self::Read,
            Self::Write => required == Self::Write,
        }
    }
}

impl fmt::Display for V1Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// STU2 CRUDS permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cruds {
    /// Create permission (`c`).
    pub create: bool,
    /// Read permission (`r`).
    pub read: bool,
    /// Update permission (`u`).
    pub update: bool,
    /// Delete permission (`d`).
    pub delete: bool,
    /// Search permission (`s`).
    pub search: bool,
}

impl Cruds {
    /// Returns true if every permission in `required` is also granted here.
    #[must_use]
    pub fn grants(&self, required: Self) -> bool {
        (!required.create || self.create)
            && (!required.read || self.read)
            && (!required.update || self.update)
            && (!required.delete || self.delete)
            && (!required.search || self.search)
    }
}

impl FromStr for Cruds {
    type Err = ScopeError;

    /// Parses an ordered CRUDS string such as `rs` or `cruds`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn order(c: char) -> Option<u8> {
            match c {
                'c' => Some(1),
                'r' => Some(2),
                'u' => Some(3),
                'd' => Some(4),
                's' => Some(5),
                _ => None,
            }
        }

        if s.is_empty() {
            return Err(ScopeError::Empty);
        }

        let mut perms = Self::default();
        let mut last: Option<u8> = None;
        for c in s.chars() {
            let this = order(c).ok_or(ScopeError::InvalidPermission(c))?;
            if last.is_some_and(|prev| this <= prev) {
                return Err(ScopeError::InvalidPermissionOrder);
            }
            match c {
                'c' => perms.create = true,
                'r' => perms.read = true,
                'u' => perms.update = true,
                'd' => perms.delete = true,
                's' => perms.search = true,
                _ => {}
            }
            last = Some(this);
        }
        Ok(perms)
    }
}

impl fmt::Display for Cruds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.create {
            write!(f, "c")?;
        }
        if self.read {
            write!(f, "r")?;
        }
        if self.update {
            write!(f, "u")?;
        }
        if self.delete {
            write!(f, "d")?;
        }
        if self.search {
            write!(f, "s")?;
        }
        Ok(())
    }
}

/// A version-tagged access suffix.
///
/// The tag makes cross-version matching structurally impossible: a v2
/// grant can never cover a v1 requirement, or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// STU1 access.
    V1(V1Access),
    /// STU2 access.
    V2(Cruds),
}

impl Access {
    /// Returns true if a grant of `self` covers a requirement of
    /// `required`. Mixed versions never match.
    #[must_use]
    pub fn grants(&self, required: &Self) -> bool {
        match (self, required) {
            (Self::V1(granted), Self::V1(req)) => granted.grants(*req),
            (Self::V2(granted), Self::V2(req)) => granted.grants(*req),
            _ => false,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1(a) => write!(f, "{a}"),
            Self::V2(c) => write!(f, "{c}"),
        }
    }
}

/// A parsed compartment scope: `compartment/Resource.access`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceScope {
    /// The compartment (`patient`, `user`, `system`).
    pub compartment: Compartment,
    /// The resource type or wildcard.
    pub resource: ResourceSelector,
    /// The version-tagged access suffix.
    pub access: Access,
    /// Optional search-parameter filter (STU2 only).
    pub filter: Option<String>,
}

impl ResourceScope {
    /// Returns true if a grant of `self` covers a requirement of
    /// `required`.
    ///
    /// A grant with a filter is narrower than the same grant without one,
    /// so it only covers a requirement carrying the identical filter.
    #[must_use]
    pub fn covers(&self, required: &Self) -> bool {
        if self.compartment != required.compartment {
            return false;
        }
        if !self.resource.covers(&required.resource) {
            return false;
        }
        if !self.access.grants(&required.access) {
            return false;
        }
        match (&self.filter, &required.filter) {
            (None, _) => true,
            (Some(a), Some(b)) => a == b,
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.compartment, self.resource, self.access)?;
        if let Some(filter) = &self.filter {
            write!(f, "?{filter}")?;
        }
        Ok(())
    }
}

/// A single parsed scope token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeToken {
    /// An un-compartmented OIDC or launch-context scope
    /// (`openid`, `fhirUser`, `launch/patient`, `offline_access`, ...).
    Context(String),
    /// A compartment resource scope.
    Resource(ResourceScope),
}

fn resource_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[A-Z][A-Za-z0-9]{0,63}$").unwrap()
    })
}

impl ScopeToken {
    /// Parses one scope token under the given grammar version.
    pub fn parse(raw: &str, version: ScopeVersion) -> Result<Self, ScopeError> {
        if raw.is_empty() {
            return Err(ScopeError::Empty);
        }

        // Bare tokens: openid, fhirUser, offline_access, launch, ...
        let Some((prefix, rest)) = raw.split_once('/') else {
            return Ok(Self::Context(raw.to_string()));
        };

        let compartment = match prefix {
            "patient" => Compartment::Patient,
            "user" => Compartment::User,
            "system" => Compartment::System,
            "launch" => return Ok(Self::Context(raw.to_string())),
            other => return Err(ScopeError::InvalidCompartment(other.to_string())),
        };

        let (body, filter) = match rest.split_once('?') {
            Some((body, filter)) => {
                if version == ScopeVersion::V1 {
                    return Err(ScopeError::FilterNotAllowed(version));
                }
                (body, Some(filter.to_string()))
            }
            None => (rest, None),
        };

        let (resource, suffix) = body
            .split_once('.')
            .ok_or_else(|| ScopeError::MissingAccess(raw.to_string()))?;

        let resource = if resource == "*" {
            ResourceSelector::Wildcard
        } else if resource_type_pattern().is_match(resource) {
            ResourceSelector::Type(resource.to_string())
        } else {
            return Err(ScopeError::InvalidResourceType(resource.to_string()));
        };

        let access = match version {
            ScopeVersion::V1 => match suffix {
                "read" => Access::V1(V1Access::Read),
                "write" => Access::V1(V1Access::Write),
                "*" => Access::V1(V1Access::Wildcard),
                other => {
                    return Err(ScopeError::InvalidAccess {
                        suffix: other.to_string(),
                        version,
                    })
                }
            },
            ScopeVersion::V2 => {
                Access::V2(suffix.parse().map_err(|err| match err {
                    ScopeError::InvalidPermission(_) | ScopeError::Empty => {
                        ScopeError::InvalidAccess {
                            suffix: suffix.to_string(),
                            version,
                        }
                    }
                    other => other,
                })?)
            }
        };

        Ok(Self::Resource(ResourceScope {
            compartment,
            resource,
            access,
            filter,
        }))
    }

    /// Returns true if the granted token covers this required token.
    #[must_use]
    pub fn satisfied_by(&self, granted: &Self) -> bool {
        match (self, granted) {
            (Self::Context(required), Self::Context(grant)) => required == grant,
            (Self::Resource(required), Self::Resource(grant)) => grant.covers(required),
            _ => false,
        }
    }

    /// Returns the compartment for resource tokens.
    #[must_use]
    pub fn compartment(&self) -> Option<Compartment> {
        match self {
            Self::Context(_) => None,
            Self::Resource(scope) => Some(scope.compartment),
        }
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(s) => write!(f, "{s}"),
            Self::Resource(scope) => write!(f, "{scope}"),
        }
    }
}

/// A requested-scope set parsed under a single grammar version.
#[derive(Debug, Clone)]
pub struct ScopeRequest {
    raw: String,
    version: ScopeVersion,
    tokens: Vec<ScopeToken>,
}

impl ScopeRequest {
    /// Parses a space-separated scope string.
    pub fn parse(raw: &str, version: ScopeVersion) -> Result<Self, ScopeError> {
        let tokens = raw
            .split_whitespace()
            .map(|token| ScopeToken::parse(token, version))
            .collect::<Result<Vec<_>, _>>()?;
        if tokens.is_empty() {
            return Err(ScopeError::Empty);
        }
        Ok(Self {
            raw: raw.split_whitespace().collect::<Vec<_>>().join(" "),
            version,
            tokens,
        })
    }

    /// The normalized raw scope string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The grammar version the request was parsed under.
    #[must_use]
    pub fn version(&self) -> ScopeVersion {
        self.version
    }

    /// The parsed tokens.
    #[must_use]
    pub fn tokens(&self) -> &[ScopeToken] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_context_tokens() {
        for raw in ["openid", "fhirUser", "offline_access", "launch/patient"] {
            let token = ScopeToken::parse(raw, ScopeVersion::V1).unwrap();
            assert_eq!(token, ScopeToken::Context(raw.to_string()));
        }
    }

    #[test]
    fn test_parse_v1_resource_scope() {
        let token = ScopeToken::parse("patient/Patient.read", ScopeVersion::V1).unwrap();
        let ScopeToken::Resource(scope) = token else {
            panic!("expected resource scope");
        };
        assert_eq!(scope.compartment, Compartment::Patient);
        assert_eq!(scope.resource, ResourceSelector::Type("Patient".to_string()));
        assert_eq!(scope.access, Access::V1(V1Access::Read));
    }

    #[test]
    fn test_parse_v1_wildcards() {
        let token = ScopeToken::parse("user/*.*", ScopeVersion::V1).unwrap();
        let ScopeToken::Resource(scope) = token else {
            panic!("expected resource scope");
        };
        assert_eq!(scope.resource, ResourceSelector::Wildcard);
        assert_eq!(scope.access, Access::V1(V1Access::Wildcard));
    }

    #[test]
    fn test_parse_v2_cruds() {
        let token = ScopeToken::parse("patient/Observation.rs", ScopeVersion::V2).unwrap();
        let ScopeToken::Resource(scope) = token else {
            panic!("expected resource scope");
        };
        let Access::V2(cruds) = scope.access else {
            panic!("expected v2 access");
        };
        assert!(cruds.read);
        assert!(cruds.search);
        assert!(!cruds.create);
    }

    #[test]
    fn test_parse_v2_filter() {
        let token =
            ScopeToken::parse("patient/Observation.rs?category=laboratory", ScopeVersion::V2)
                .unwrap();
        let ScopeToken::Resource(scope) = token else {
            panic!("expected resource scope");
        };
        assert_eq!(scope.filter.as_deref(), Some("category=laboratory"));
    }

    #[test]
    fn test_filter_rejected_under_v1() {
        let err = ScopeToken::parse("patient/Observation.read?category=lab", ScopeVersion::V1)
            .unwrap_err();
        assert!(matches!(err, ScopeError::FilterNotAllowed(ScopeVersion::V1)));
    }

    #[test]
    fn test_cross_version_suffixes_rejected() {
        assert!(matches!(
            ScopeToken::parse("patient/Patient.rs", ScopeVersion::V1),
            Err(ScopeError::InvalidAccess { .. })
        ));
        assert!(matches!(
            ScopeToken::parse("patient/Patient.read", ScopeVersion::V2),
            Err(ScopeError::InvalidAccess { .. })
        ));
    }

    #[test]
    fn test_cruds_order_enforced() {
        assert!("rs".parse::<Cruds>().is_ok());
        assert!(matches!(
            "sr".parse::<Cruds>(),
            Err(ScopeError::InvalidPermissionOrder)
        ));
        assert!(matches!(
            "rx".parse::<Cruds>(),
            Err(ScopeError::InvalidPermission('x'))
        ));
    }

    #[test]
    fn test_invalid_compartment() {
        assert!(matches!(
            ScopeToken::parse("practitioner/Patient.read", ScopeVersion::V1),
            Err(ScopeError::InvalidCompartment(_))
        ));
    }

    #[test]
    fn test_missing_access_suffix() {
        assert!(matches!(
            ScopeToken::parse("patient/Patient", ScopeVersion::V1),
            Err(ScopeError::MissingAccess(_))
        ));
    }

    #[test]
    fn test_cross_version_grants_never_match() {
        let v1 = Access::V1(V1Access::Read);
        let v2 = Access::V2("r".parse().unwrap());
        assert!(!v1.grants(&v2));
        assert!(!v2.grants(&v1));
    }

    #[test]
    fn test_v1_wildcard_grants_read_and_write() {
        assert!(V1Access::Wildcard.grants(V1Access::Read));
        assert!(V1Access::Wildcard.grants(V1Access::Write));
        assert!(!V1Access::Write.grants(V1Access::Read));
        assert!(!V1Access::Read.grants(V1Access::Wildcard));
    }

    #[test]
    fn test_cruds_superset_grants() {
        let granted: Cruds = "cruds".parse().unwrap();
        let required: Cruds = "r".parse().unwrap();
        assert!(granted.grants(required));
        assert!(!required.grants(granted));
    }

    #[test]
    fn test_wildcard_resource_covers_specific() {
        let granted = ScopeToken::parse("patient/*.rs", ScopeVersion::V2).unwrap();
        let required = ScopeToken::parse("patient/Condition.rs", ScopeVersion::V2).unwrap();
        assert!(required.satisfied_by(&granted));
        assert!(!granted.satisfied_by(&required));
    }

    #[test]
    fn test_compartment_mismatch_never_satisfies() {
        let granted = ScopeToken::parse("user/*.read", ScopeVersion::V1).unwrap();
        let required = ScopeToken::parse("patient/Patient.read", ScopeVersion::V1).unwrap();
        assert!(!required.satisfied_by(&granted));
    }

    #[test]
    fn test_filtered_grant_is_narrower() {
        let narrow =
            ScopeToken::parse("patient/Observation.rs?category=laboratory", ScopeVersion::V2)
                .unwrap();
        let broad = ScopeToken::parse("patient/Observation.rs", ScopeVersion::V2).unwrap();
        assert!(!broad.satisfied_by(&narrow));
        assert!(narrow.satisfied_by(&broad));
    }

    #[test]
    fn test_scope_request_normalizes_whitespace() {
        let request =
            ScopeRequest::parse("  openid   launch/patient\npatient/Patient.read ", ScopeVersion::V1)
                .unwrap();
        assert_eq!(request.raw(), "openid launch/patient patient/Patient.read");
        assert_eq!(request.tokens().len(), 3);
    }

    #[test]
    fn test_scope_request_rejects_empty() {
        assert!(matches!(
            ScopeRequest::parse("   ", ScopeVersion::V1),
            Err(ScopeError::Empty)
        ));
    }

    #[test]
    fn test_token_display_round_trips() {
        for (raw, version) in [
            ("openid", ScopeVersion::V1),
            ("launch/patient", ScopeVersion::V1),
            ("patient/Patient.read", ScopeVersion::V1),
            ("user/*.write", ScopeVersion::V1),
            ("patient/Observation.rs", ScopeVersion::V2),
            ("system/Device.cruds", ScopeVersion::V2),
            ("patient/Observation.rs?category=laboratory", ScopeVersion::V2),
        ] {
            let token = ScopeToken::parse(raw, version).unwrap();
            assert_eq!(token.to_string(), raw);
        }
    }
}
