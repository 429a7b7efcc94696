//! Sequential stage group execution.

use super::{FlowNode, StageGroup};
use crate::cancellation::RunToken;
use crate::context::ScopeChain;
use crate::core::{RunReport, StageResult};
use crate::credentials::CredentialStore;
use crate::stages::{Stage, StageContext};
use futures::future::BoxFuture;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Drives a stage group tree strictly in declaration order.
///
/// Later stages commonly depend on earlier stages' outputs and the
/// authorization flow is inherently sequential, so nothing runs
/// concurrently within a run; suspension happens only inside
/// collaborator calls.
pub struct GroupRunner<'a> {
    store: &'a CredentialStore,
    token: &'a RunToken,
}

impl<'a> GroupRunner<'a> {
    /// Creates a runner over the run's shared store and cancellation
    /// token.
    #[must_use]
    pub fn new(store: &'a CredentialStore, token: &'a RunToken) -> Self {
        Self { store, token }
    }

    /// Runs a root group seeded with the host configuration surface and
    /// returns the root frame's values (the named outputs published at
    /// exit).
    pub async fn run_root(
        &self,
        group: &StageGroup,
        seed: HashMap<String, serde_json::Value>,
        report: &mut RunReport,
    ) -> HashMap<String, serde_json::Value> {
        let mut chain = ScopeChain::new();
        chain.push_frame(group.bindings().clone(), group.locked_inputs().clone());
        for (name, value) in seed {
            chain.insert(&name, value);
        }

        self.run_children(group, &mut chain, group.name().to_string(), report)
            .await;

        if self.token.is_cancelled() {
            // Partially populated context is discarded on abort.
            chain.pop_frame();
            return HashMap::new();
        }
        chain
            .pop_frame()
            .map(crate::context::Frame::into_values)
            .unwrap_or_default()
    }

    /// Runs the children of `group` against the innermost frame of
    /// `chain`. Returns true if any descendant failed or errored.
    fn run_children<'b>(
        &'b self,
        group: &'b StageGroup,
        chain: &'b mut ScopeChain,
        path: String,
        report: &'b mut RunReport,
    ) -> BoxFuture<'b, bool> {
        Box::pin(async move {
            let mut problem = false;
            let mut aborted_after: Option<String> = None;

            for child in group.children() {
                if self.token.is_cancelled() {
                    warn!(
                        group = %group.name(),
                        reason = ?self.token.reason(),
                        "run cancelled, abandoning remaining stages"
                    );
                    break;
                }

                let child_path = format!("{path}/{}", child.name());

                if let Some(failed) = &aborted_after {
                    let result = StageResult::skip(format!(
                        "not attempted: group '{}' aborted after '{failed}'",
                        group.name()
                    ));
                    report.record(child_path, child.name(), &result);
                    continue;
                }

                let child_problem = match child {
                    FlowNode::Stage(stage) => {
                        let result = self.run_stage(stage.as_ref(), chain, &child_path).await;
                        if result.status.is_problem() {
                            warn!(stage = %stage.name(), status = %result.status, message = ?result.message, "stage did not pass");
                        }
                        let outputs = result.outputs.clone();
                        report.record(child_path, stage.name(), &result);
                        for (name, value) in outputs {
                            chain.insert(&name, value);
                        }
                        result.status.is_problem()
                    }
                    FlowNode::Group(sub) => {
                        debug!(group = %sub.name(), "entering group");
                        chain.push_frame(sub.bindings().clone(), sub.locked_inputs().clone());
                        let sub_problem = self
                            .run_children(sub, chain, child_path, report)
                            .await;
                        let values = chain
                            .pop_frame()
                            .map(crate::context::Frame::into_values)
                            .unwrap_or_default();
                        for name in sub.produced_outputs() {
                            if let Some(value) = values.get(&name) {
                                chain.insert(&name, value.clone());
                            }
                        }
                        sub_problem
                    }
                };

                if child_problem {
                    problem = true;
                    if group.is_fail_fast() {
                        aborted_after = Some(child.name().to_string());
                    }
                }
            }

            problem
        })
    }

    /// Runs one stage, enforcing the required-input precondition on its
    /// behalf.
    async fn run_stage(
        &self,
        stage: &dyn Stage,
        chain: &ScopeChain,
        path: &str,
    ) -> StageResult {
        for name in stage.required_inputs() {
            if chain.lookup(name).is_none() {
                debug!(stage = %stage.name(), input = %name, "skipping stage, required input missing");
                return StageResult::skip_missing(*name);
            }
        }

        let mut inputs = HashMap::new();
        for name in stage
            .required_inputs()
            .iter()
            .chain(stage.optional_inputs())
        {
            if let Some(value) = chain.lookup(name) {
                inputs.insert((*name).to_string(), value.clone());
            }
        }

        debug!(stage = %stage.name(), path = %path, "running stage");
        let ctx = StageContext::new(inputs, self.store, self.token, path);
        stage.run(&ctx).await
    }
}
