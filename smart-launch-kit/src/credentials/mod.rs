//! Credential bundles and the per-run credential store.
//!
//! A [`CredentialBundle`] is the set of tokens and metadata produced by a
//! successful authorization or refresh. Bundles are immutable once
//! published: a refresh supersedes a bundle with a new one under a new
//! handle, it never mutates in place.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Tokens and metadata resulting from a successful authorization or
/// refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// The OAuth2 access token.
    pub access_token: String,
    /// The refresh token, when the server granted `offline_access`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// The OpenID Connect ID token, when `openid` was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// The token type reported by the server (expected `Bearer`).
    pub token_type: String,
    /// The granted scopes, in grant order.
    pub scopes: Vec<String>,
    /// When the access token expires, if the server reported a lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// When the bundle was retrieved from the token endpoint.
    pub retrieved_at: DateTime<Utc>,
}

impl CredentialBundle {
    /// Computes `expires_at` from a token-endpoint `expires_in` lifetime.
    #[must_use]
    pub fn expiry_from_lifetime(
        retrieved_at: DateTime<Utc>,
        expires_in: Option<u64>,
    ) -> Option<DateTime<Utc>> {
        expires_in.and_then(|secs| {
            i64::try_from(secs)
                .ok()
                .map(|secs| retrieved_at + Duration::seconds(secs))
        })
    }

    /// Returns the granted scopes as a space-separated string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Returns the remaining lifetime in whole seconds at `now`, if known.
    #[must_use]
    pub fn expires_in_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|at| (at - now).num_seconds())
    }

    /// Returns true if the access token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// An opaque handle to a published credential bundle.
///
/// Handles travel through the binding context as strings; the bundle
/// itself stays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHandle(Uuid);

impl CredentialHandle {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CredentialHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The per-run store of published credential bundles.
///
/// Single writer per handle: a handle is published exactly once, after the
/// producing stage's run contract has returned, so readers always see a
/// fully formed bundle. A refresh publishes a new handle; the old bundle
/// remains readable for diagnostics.
#[derive(Debug, Default)]
pub struct CredentialStore {
    bundles: RwLock<HashMap<CredentialHandle, Arc<CredentialBundle>>>,
}

impl CredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a bundle and returns its handle.
    pub fn put(&self, bundle: CredentialBundle) -> CredentialHandle {
        let handle = CredentialHandle::generate();
        self.bundles.write().insert(handle, Arc::new(bundle));
        handle
    }

    /// Reads the bundle for a handle.
    #[must_use]
    pub fn get(&self, handle: CredentialHandle) -> Option<Arc<CredentialBundle>> {
        self.bundles.read().get(&handle).cloned()
    }

    /// Returns every published bundle, for diagnostics.
    ///
    /// Superseded bundles stay readable; a refresh never removes the
    /// bundle it replaced.
    #[must_use]
    pub fn bundles(&self) -> Vec<Arc<CredentialBundle>> {
        self.bundles.read().values().cloned().collect()
    }

    /// Returns the number of published bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.read().len()
    }

    /// Returns true if nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.read().is_empty()
    }
}
