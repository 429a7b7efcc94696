//! Mock stages and collaborators for testing.

use crate::collaborators::{
    AuthorizationEndpoint, AuthorizationGrant, AuthorizationRequest,
    CapabilityDiscovery, ClientCredentials, CollaboratorError, ResourceAccess,
    ResourceOutcome, TokenEndpoint, TokenResponse,
};
use crate::core::StageResult;
use crate::flow::FlowVariant;
use crate::stages::{Stage, StageContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// A mock stage with scripted declarations and result.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    required: Vec<&'static str>,
    produced: Vec<&'static str>,
    result: Mutex<StageResult>,
    call_count: Mutex<usize>,
    seen_inputs: Mutex<Vec<HashMap<String, serde_json::Value>>>,
}

impl MockStage {
    /// Creates a mock stage that passes with no declarations.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            produced: Vec::new(),
            result: Mutex::new(StageResult::pass()),
            call_count: Mutex::new(0),
            seen_inputs: Mutex::new(Vec::new()),
        }
    }

    /// Declares required inputs.
    #[must_use]
    pub fn requiring(mut self, inputs: &[&'static str]) -> Self {
        self.required = inputs.to_vec();
        self
    }

    /// Declares produced outputs.
    #[must_use]
    pub fn producing(mut self, outputs: &[&'static str]) -> Self {
        self.produced = outputs.to_vec();
        self
    }

    /// Scripts the result to return.
    #[must_use]
    pub fn returning(self, result: StageResult) -> Self {
        *self.result.lock() = result;
        self
    }

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns the inputs seen on each run.
    #[must_use]
    pub fn seen_inputs(&self) -> Vec<HashMap<String, serde_json::Value>> {
        self.seen_inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_inputs(&self) -> &[&str] {
        &self.required
    }

    fn produced_outputs(&self) -> &[&str] {
        &self.produced
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        *self.call_count.lock() += 1;
        let inputs: HashMap<String, serde_json::Value> = self
            .required
            .iter()
            .filter_map(|name| ctx.get(name).map(|v| ((*name).to_string(), v.clone())))
            .collect();
        self.seen_inputs.lock().push(inputs);
        self.result.lock().clone()
    }
}

/// A capability discovery mock returning a scripted capability set.
#[derive(Debug)]
pub struct MockDiscovery {
    outcome: Mutex<Result<HashSet<String>, CollaboratorError>>,
    calls: Mutex<usize>,
}

impl MockDiscovery {
    /// Creates a mock advertising the given capabilities.
    #[must_use]
    pub fn with_capabilities(capabilities: &[&str]) -> Self {
        Self {
            outcome: Mutex::new(Ok(capabilities
                .iter()
                .map(ToString::to_string)
                .collect())),
            calls: Mutex::new(0),
        }
    }

    /// Creates a mock whose fetch fails.
    #[must_use]
    pub fn failing(err: CollaboratorError) -> Self {
        Self {
            outcome: Mutex::new(Err(err)),
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of fetches.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl CapabilityDiscovery for MockDiscovery {
    async fn fetch_capabilities(
        &self,
        _variant: FlowVariant,
    ) -> Result<HashSet<String>, CollaboratorError> {
        *self.calls.lock() += 1;
        self.outcome.lock().clone()
    }
}

/// An authorization endpoint mock that echoes the request state.
#[derive(Debug)]
pub struct MockAuthorizationEndpoint {
    outcome: Mutex<Result<String, CollaboratorError>>,
    state_override: Mutex<Option<String>>,
    requests: Mutex<Vec<AuthorizationRequest>>,
}

impl MockAuthorizationEndpoint {
    /// Creates a mock granting the given authorization code.
    #[must_use]
    pub fn granting(code: impl Into<String>) -> Self {
        Self {
            outcome: Mutex::new(Ok(code.into())),
            state_override: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock whose redirect fails.
    #[must_use]
    pub fn failing(err: CollaboratorError) -> Self {
        Self {
            outcome: Mutex::new(Err(err)),
            state_override: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Makes the mock return a fixed (wrong) state instead of echoing.
    #[must_use]
    pub fn with_state(self, state: impl Into<String>) -> Self {
        *self.state_override.lock() = Some(state.into());
        self
    }

    /// Returns the authorization requests seen.
    #[must_use]
    pub fn requests(&self) -> Vec<AuthorizationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AuthorizationEndpoint for MockAuthorizationEndpoint {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationGrant, CollaboratorError> {
        self.requests.lock().push(request.clone());
        let code = self.outcome.lock().clone()?;
        let state = self
            .state_override
            .lock()
            .clone()
            .or_else(|| Some(request.state.clone()));
        Ok(AuthorizationGrant { code, state })
    }
}

/// A recorded code exchange call.
#[derive(Debug, Clone)]
pub struct ExchangeCall {
    /// The authorization code presented.
    pub code: String,
    /// The PKCE verifier, when sent.
    pub pkce_verifier: Option<String>,
    /// The client id presented.
    pub client_id: String,
}

/// A recorded refresh call.
#[derive(Debug, Clone)]
pub struct RefreshCall {
    /// The refresh token presented.
    pub refresh_token: String,
    /// The scope parameter, when sent.
    pub scope: Option<String>,
}

/// A token endpoint mock with scripted exchange and refresh responses.
#[derive(Debug)]
pub struct MockTokenEndpoint {
    exchange_outcome: Mutex<Result<TokenResponse, CollaboratorError>>,
    refresh_outcome: Mutex<Result<TokenResponse, CollaboratorError>>,
    exchange_calls: Mutex<Vec<ExchangeCall>>,
    refresh_calls: Mutex<Vec<RefreshCall>>,
}

impl Default for MockTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenEndpoint {
    /// Creates a mock whose calls fail until scripted.
    #[must_use]
    pub fn new() -> Self {
        let unconfigured =
            || Err(CollaboratorError::Protocol("not configured".to_string()));
        Self {
            exchange_outcome: Mutex::new(unconfigured()),
            refresh_outcome: Mutex::new(unconfigured()),
            exchange_calls: Mutex::new(Vec::new()),
            refresh_calls: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the code exchange response.
    #[must_use]
    pub fn with_exchange(self, response: TokenResponse) -> Self {
        *self.exchange_outcome.lock() = Ok(response);
        self
    }

    /// Scripts a code exchange failure.
    #[must_use]
    pub fn with_exchange_error(self, err: CollaboratorError) -> Self {
        *self.exchange_outcome.lock() = Err(err);
        self
    }

    /// Scripts the refresh response.
    #[must_use]
    pub fn with_refresh(self, response: TokenResponse) -> Self {
        *self.refresh_outcome.lock() = Ok(response);
        self
    }

    /// Scripts a refresh failure.
    #[must_use]
    pub fn with_refresh_error(self, err: CollaboratorError) -> Self {
        *self.refresh_outcome.lock() = Err(err);
        self
    }

    /// Returns the code exchange calls seen.
    #[must_use]
    pub fn exchange_calls(&self) -> Vec<ExchangeCall> {
        self.exchange_calls.lock().clone()
    }

    /// Returns the refresh calls seen.
    #[must_use]
    pub fn refresh_calls(&self) -> Vec<RefreshCall> {
        self.refresh_calls.lock().clone()
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
        _redirect_uri: &str,
        credentials: &ClientCredentials,
    ) -> Result<TokenResponse, CollaboratorError> {
        self.exchange_calls.lock().push(ExchangeCall {
            code: code.to_string(),
            pkce_verifier: pkce_verifier.map(ToString::to_string),
            client_id: credentials.client_id.clone(),
        });
        self.exchange_outcome.lock().clone()
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        _credentials: &ClientCredentials,
        scope: Option<&str>,
    ) -> Result<TokenResponse, CollaboratorError> {
        self.refresh_calls.lock().push(RefreshCall {
            refresh_token: refresh_token.to_string(),
            scope: scope.map(ToString::to_string),
        });
        self.refresh_outcome.lock().clone()
    }
}

/// A recorded resource read.
#[derive(Debug, Clone)]
pub struct ReadCall {
    /// The resource type read.
    pub resource_type: String,
    /// The patient id in context.
    pub patient_id: String,
    /// The bearer token presented, if any.
    pub access_token: Option<String>,
}

/// A resource access mock.
///
/// Unauthenticated reads answer 401 by default; authenticated reads
/// answer 200 with a minimal resource unless a type is scripted
/// otherwise.
#[derive(Debug)]
pub struct MockResourceAccess {
    unauthenticated_status: Mutex<u16>,
    scripted: Mutex<HashMap<String, ResourceOutcome>>,
    error: Mutex<Option<CollaboratorError>>,
    reads: Mutex<Vec<ReadCall>>,
}

impl Default for MockResourceAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResourceAccess {
    /// Creates a well-behaved server mock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            unauthenticated_status: Mutex::new(401),
            scripted: Mutex::new(HashMap::new()),
            error: Mutex::new(None),
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Sets the status answered to unauthenticated reads.
    #[must_use]
    pub fn unauthenticated_status(self, status: u16) -> Self {
        *self.unauthenticated_status.lock() = status;
        self
    }

    /// Scripts the outcome for authenticated reads of one type.
    #[must_use]
    pub fn respond_with(self, resource_type: &str, outcome: ResourceOutcome) -> Self {
        self.scripted
            .lock()
            .insert(resource_type.to_string(), outcome);
        self
    }

    /// Makes every read fail at the transport level.
    #[must_use]
    pub fn failing(self, err: CollaboratorError) -> Self {
        *self.error.lock() = Some(err);
        self
    }

    /// Returns the reads seen.
    #[must_use]
    pub fn reads(&self) -> Vec<ReadCall> {
        self.reads.lock().clone()
    }
}

#[async_trait]
impl ResourceAccess for MockResourceAccess {
    async fn read(
        &self,
        resource_type: &str,
        patient_id: &str,
        access_token: Option<&str>,
    ) -> Result<ResourceOutcome, CollaboratorError> {
        self.reads.lock().push(ReadCall {
            resource_type: resource_type.to_string(),
            patient_id: patient_id.to_string(),
            access_token: access_token.map(ToString::to_string),
        });

        if let Some(err) = self.error.lock().clone() {
            return Err(err);
        }

        if access_token.is_none() {
            return Ok(ResourceOutcome {
                status: *self.unauthenticated_status.lock(),
                resource: None,
            });
        }

        if let Some(outcome) = self.scripted.lock().get(resource_type) {
            return Ok(outcome.clone());
        }

        Ok(ResourceOutcome {
            status: 200,
            resource: Some(serde_json::json!({
                "resourceType": resource_type,
                "id": patient_id,
            })),
        })
    }
}
