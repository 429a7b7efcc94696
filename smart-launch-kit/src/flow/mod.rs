//! The standalone launch flow orchestrator.
//!
//! Builds the stage group tree for the selected protocol version and
//! drives it through four states: discovery, launch and token exchange,
//! context and identity validation, refresh and revalidation. Every
//! state runs even when an earlier one fails; stages whose required
//! inputs never materialized skip automatically, so a run always surfaces
//! maximal diagnostics.

mod config;
mod variant;

pub use config::FlowConfig;
pub use variant::{FlowVariant, REQUIRED_CONTEXT_SCOPES, USCDI_RESOURCE_TYPES};

use crate::cancellation::RunToken;
use crate::collaborators::Collaborators;
use crate::context::BindingTable;
use crate::core::RunReport;
use crate::credentials::CredentialStore;
use crate::errors::FlowError;
use crate::group::{GroupRunner, StageGroup};
use crate::scopes::Compartment;
use crate::stages::{
    AuthorizationRequestStage, CodeExchangeStage, CredentialsExportStage,
    OpenIdIdentityStage, PatientContextStage, ScopeGrantStage, TokenRefreshStage,
    UnauthorizedAccessStage, UnrestrictedResourceAccessStage,
    WellKnownCapabilitiesStage,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// The orchestrator's top-level states, driven in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Capability discovery.
    Discovery,
    /// Authorization, code exchange, scope grant, and context checks.
    LaunchAndTokenExchange,
    /// OpenID Connect identity validation.
    ContextAndIdentityValidation,
    /// Token refresh, revalidation, access sweep, and export.
    RefreshAndRevalidation,
    /// Terminal state.
    Done,
}

impl FlowState {
    /// The state driven after this one.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Discovery => Self::LaunchAndTokenExchange,
            Self::LaunchAndTokenExchange => Self::ContextAndIdentityValidation,
            Self::ContextAndIdentityValidation => Self::RefreshAndRevalidation,
            Self::RefreshAndRevalidation | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::LaunchAndTokenExchange => write!(f, "launch_and_token_exchange"),
            Self::ContextAndIdentityValidation => {
                write!(f, "context_and_identity_validation")
            }
            Self::RefreshAndRevalidation => write!(f, "refresh_and_revalidation"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// What a run produces: the full stage report and the named outputs
/// published at exit.
#[derive(Debug)]
pub struct FlowOutcome {
    /// Every stage record, in execution order.
    pub report: RunReport,
    /// The host-facing named outputs (`smart_credentials`, `patient_id`,
    /// and the accumulated suite-level values).
    pub exports: HashMap<String, serde_json::Value>,
}

impl FlowOutcome {
    /// Reads a named export.
    #[must_use]
    pub fn export(&self, name: &str) -> Option<&serde_json::Value> {
        self.exports.get(name)
    }
}

/// Drives a client through the SMART standalone launch conformance flow.
pub struct StandaloneLaunchFlow {
    variant: FlowVariant,
    config: FlowConfig,
    states: Vec<(FlowState, StageGroup)>,
    store: Arc<CredentialStore>,
    token: RunToken,
}

impl StandaloneLaunchFlow {
    /// Builds the flow for a protocol version.
    ///
    /// The variant is fixed here: it selects the capability list checked
    /// in discovery, the scope grammar, and the locked STU2 launch
    /// inputs. The group trees are assembled once at construction, not
    /// resolved by name at run time.
    pub fn new(
        variant: FlowVariant,
        config: FlowConfig,
        collaborators: Collaborators,
    ) -> Result<Self, FlowError> {
        config.validate()?;

        let states = vec![
            (FlowState::Discovery, build_discovery(variant, &collaborators)),
            (
                FlowState::LaunchAndTokenExchange,
                build_launch(variant, &collaborators)?,
            ),
            (
                FlowState::ContextAndIdentityValidation,
                build_identity()?,
            ),
            (
                FlowState::RefreshAndRevalidation,
                build_refresh(variant, &collaborators)?,
            ),
        ];

        Ok(Self {
            variant,
            config,
            states,
            store: Arc::new(CredentialStore::new()),
            token: RunToken::new(),
        })
    }

    /// The protocol version under test.
    #[must_use]
    pub fn variant(&self) -> FlowVariant {
        self.variant
    }

    /// The run's credential store, for resolving exported handles.
    #[must_use]
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// A handle the host can use to abort the run.
    #[must_use]
    pub fn run_token(&self) -> RunToken {
        self.token.clone()
    }

    fn seed_context(&self) -> HashMap<String, serde_json::Value> {
        let mut seed = HashMap::new();
        seed.insert(
            "url".to_string(),
            serde_json::json!(self.config.fhir_base_url),
        );
        seed.insert(
            "redirect_uri".to_string(),
            serde_json::json!(self.config.redirect_uri),
        );
        seed.insert(
            "standalone_client_id".to_string(),
            serde_json::json!(self.config.client_id),
        );
        if let Some(secret) = &self.config.client_secret {
            seed.insert(
                "standalone_client_secret".to_string(),
                serde_json::json!(secret),
            );
        }
        let scopes = self
            .config
            .requested_scopes
            .clone()
            .unwrap_or_else(|| self.variant.default_requested_scopes());
        seed.insert(
            "standalone_requested_scopes".to_string(),
            serde_json::json!(scopes),
        );
        seed
    }

    /// Runs every state in order and returns the report and exports.
    ///
    /// A host abort stops the run between stages and discards the
    /// partially populated context; the records produced so far are
    /// still returned.
    pub async fn run(&self) -> Result<FlowOutcome, FlowError> {
        let runner = GroupRunner::new(&self.store, &self.token);
        let mut report = RunReport::new();
        let mut context = self.seed_context();

        let mut state = FlowState::Discovery;
        while state != FlowState::Done {
            if self.token.is_cancelled() {
                info!(reason = ?self.token.reason(), "run aborted");
                context = HashMap::new();
                break;
            }
            if let Some((_, group)) = self.states.iter().find(|(s, _)| *s == state) {
                info!(state = %state, variant = %self.variant, "entering state");
                context = runner.run_root(group, context, &mut report).await;
            }
            state = state.next();
        }

        Ok(FlowOutcome {
            report,
            exports: context,
        })
    }
}

fn build_discovery(variant: FlowVariant, collaborators: &Collaborators) -> StageGroup {
    StageGroup::new("discovery").stage(WellKnownCapabilitiesStage::new(
        collaborators.discovery.clone(),
        variant,
    ))
}

fn suite_bindings(names: &[(&str, &str)]) -> Result<BindingTable, FlowError> {
    let mut table = BindingTable::new();
    for (child, parent) in names {
        table = table.bind(*child, *parent)?;
    }
    Ok(table)
}

fn build_launch(
    variant: FlowVariant,
    collaborators: &Collaborators,
) -> Result<StageGroup, FlowError> {
    let bindings = suite_bindings(&[
        ("client_id", "standalone_client_id"),
        ("client_secret", "standalone_client_secret"),
        ("requested_scopes", "standalone_requested_scopes"),
        ("received_scopes", "standalone_received_scopes"),
        ("patient_id", "standalone_patient_id"),
        ("smart_credentials", "standalone_smart_credentials"),
        ("refresh_token", "standalone_refresh_token"),
        ("access_token", "standalone_access_token"),
        ("token_retrieval_time", "standalone_token_retrieval_time"),
        ("expires_in", "standalone_expires_in"),
        ("id_token", "standalone_id_token"),
        ("authorization_method", "standalone_authorization_method"),
    ])?;

    let mut group = StageGroup::new("standalone_launch").with_bindings(bindings);

    // STU2 forces PKCE and GET-based authorization; these are fixed by
    // the suite and not overridable downstream.
    if variant == FlowVariant::Stu2 {
        group = group
            .lock_input("use_pkce", serde_json::json!("true"))
            .lock_input("pkce_code_challenge_method", serde_json::json!("S256"))
            .lock_input("standalone_authorization_method", serde_json::json!("get"));
    }

    Ok(group
        .stage(AuthorizationRequestStage::new(
            collaborators.authorization.clone(),
        ))
        .stage(CodeExchangeStage::new(collaborators.tokens.clone()))
        .stage(ScopeGrantStage::new(
            variant.scope_version(),
            REQUIRED_CONTEXT_SCOPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            Compartment::Patient,
        ))
        .stage(UnauthorizedAccessStage::new(collaborators.resources.clone()))
        .stage(PatientContextStage::new(collaborators.resources.clone())))
}

fn build_identity() -> Result<StageGroup, FlowError> {
    let bindings = suite_bindings(&[
        ("id_token", "standalone_id_token"),
        ("client_id", "standalone_client_id"),
        ("requested_scopes", "standalone_requested_scopes"),
        ("smart_credentials", "standalone_smart_credentials"),
    ])?;

    Ok(StageGroup::new("openid_connect")
        .with_bindings(bindings)
        .stage(OpenIdIdentityStage::new()))
}

fn build_refresh(
    variant: FlowVariant,
    collaborators: &Collaborators,
) -> Result<StageGroup, FlowError> {
    let refresh_bindings = suite_bindings(&[
        ("refresh_token", "standalone_refresh_token"),
        ("client_id", "standalone_client_id"),
        ("client_secret", "standalone_client_secret"),
        ("received_scopes", "standalone_received_scopes"),
        ("smart_credentials", "standalone_smart_credentials"),
        ("patient_id", "standalone_patient_id"),
        ("access_token", "standalone_access_token"),
        ("token_retrieval_time", "standalone_token_retrieval_time"),
        ("expires_in", "standalone_expires_in"),
    ])?;

    // A failed refresh would leave the stale bundle visible to the
    // revalidation stage, so the refresh subtree fails fast.
    let token_refresh = StageGroup::new("token_refresh")
        .with_bindings(refresh_bindings)
        .fail_fast()
        .stage(TokenRefreshStage::new(collaborators.tokens.clone()))
        .stage(PatientContextStage::refresh_test(
            collaborators.resources.clone(),
        ));

    let access_bindings = suite_bindings(&[
        ("received_scopes", "standalone_received_scopes"),
        ("patient_id", "standalone_patient_id"),
        ("smart_credentials", "standalone_smart_credentials"),
    ])?;

    let unrestricted_access = StageGroup::new("unrestricted_resource_access")
        .with_bindings(access_bindings)
        .stage(UnrestrictedResourceAccessStage::new(
            collaborators.resources.clone(),
            USCDI_RESOURCE_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            variant.scope_version(),
        ));

    Ok(StageGroup::new("refresh_and_revalidation")
        .group(token_refresh)
        .group(unrestricted_access)
        .stage(CredentialsExportStage::new()))
}
