//! The orchestration engine: walks the plan's command list phase by phase.
//!
//! Launch and relaunch walk forward and stop at the first failure, because
//! later commands assume earlier ones succeeded. Shutdown, cleanup and
//! health checks walk in reverse and visit every command, so a partially
//! broken cluster is still torn down and inspected as far as possible.

use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};
use std::sync::Arc;

use crate::actions::{CommandActions, LocalActions};
use crate::dispatch::{DispatchRelay, Phase};
use crate::plan::{ClusterCommand, ClusterPlan, DispatcherInfo, PlanError, RunInfo};

/// Aggregate outcome of one lifecycle pass over the plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub error: bool,
    pub results: Vec<RunInfo>,
}

/// A command's result paired with its position in the plan, so reverse
/// traversals can restore forward order without off-by-one mistakes.
struct IndexedResult {
    index: usize,
    result: RunInfo,
}

/// Orchestrates one cluster plan on behalf of one dispatcher identity.
pub struct Kickstarter {
    plan: ClusterPlan,
    myname: String,
    actions: Arc<dyn CommandActions>,
    relay: DispatchRelay,
    run_info: Vec<RunInfo>,
    logger: Logger,
}

impl Kickstarter {
    /// Create a kickstarter backed by the real process actions.
    pub fn new(
        plan: ClusterPlan,
        myname: impl Into<String>,
        logger: Logger,
    ) -> Result<Self, PlanError> {
        let actions = Arc::new(LocalActions::new(logger.clone()));
        Self::with_actions(plan, myname, actions, logger)
    }

    /// Create a kickstarter with injected action handlers.
    pub fn with_actions(
        plan: ClusterPlan,
        myname: impl Into<String>,
        actions: Arc<dyn CommandActions>,
        logger: Logger,
    ) -> Result<Self, PlanError> {
        plan.validate()?;

        Ok(Self {
            relay: DispatchRelay::new(logger.clone()),
            plan,
            myname: myname.into(),
            actions,
            run_info: Vec::new(),
            logger,
        })
    }

    pub fn plan(&self) -> &ClusterPlan {
        &self.plan
    }

    pub fn myname(&self) -> &str {
        &self.myname
    }

    /// Results of the last launch or relaunch, positionally aligned with
    /// the plan's commands.
    pub fn run_info(&self) -> &[RunInfo] {
        &self.run_info
    }

    /// Restore launch results saved elsewhere, e.g. before a shutdown in a
    /// fresh process.
    pub fn set_run_info(&mut self, run_info: Vec<RunInfo>) {
        self.run_info = run_info;
    }

    /// Boot the cluster, wiping any prior on-disk state.
    pub async fn launch(&mut self) -> PhaseReport {
        self.launch_pass(false).await
    }

    /// Boot the cluster again on top of existing data.
    pub async fn relaunch(&mut self) -> PhaseReport {
        self.launch_pass(true).await
    }

    /// Stop every process the last launch recorded, gracefully first and
    /// forcefully after.
    pub async fn shutdown(&self) -> PhaseReport {
        self.reverse_pass(Phase::Shutdown).await
    }

    /// Remove the on-disk state the plan's commands created.
    pub async fn cleanup(&self) -> PhaseReport {
        self.reverse_pass(Phase::Cleanup).await
    }

    /// Report per-command process liveness without changing anything.
    pub async fn is_healthy(&self) -> PhaseReport {
        self.reverse_pass(Phase::IsHealthy).await
    }

    fn is_local(&self, cmd: &ClusterCommand) -> bool {
        match &cmd.dispatcher {
            Some(id) => id == &self.myname,
            None => true,
        }
    }

    fn local_dispatcher(&self) -> DispatcherInfo {
        self.plan
            .dispatchers
            .get(&self.myname)
            .cloned()
            .unwrap_or_else(|| DispatcherInfo {
                id: self.myname.clone(),
                endpoint: "tcp://127.0.0.1".to_string(),
                username: None,
                passwd: None,
                server_args: Vec::new(),
            })
    }

    fn relay_target(&self, cmd: &ClusterCommand) -> Option<&DispatcherInfo> {
        cmd.dispatcher
            .as_ref()
            .and_then(|id| self.plan.dispatchers.get(id))
    }

    async fn launch_pass(&mut self, is_relaunch: bool) -> PhaseReport {
        let phase = if is_relaunch {
            Phase::Relaunch
        } else {
            Phase::Launch
        };
        let local = self.local_dispatcher();

        let mut results: Vec<RunInfo> = Vec::new();
        let mut error = false;

        for (index, cmd) in self.plan.commands.iter().enumerate() {
            info!(self.logger, "executing command";
                "index" => index,
                "action" => cmd.action.name(),
                "phase" => phase.name()
            );

            let result = if self.is_local(cmd) {
                self.actions.launch(&local, cmd, is_relaunch).await
            } else {
                match self.relay_target(cmd) {
                    Some(target) => {
                        self.relay
                            .dispatch(&self.plan.dispatchers, target, phase, cmd, None)
                            .await
                    }
                    // Unreachable after plan validation
                    None => RunInfo::failed("command references unknown dispatcher"),
                }
            };

            let failed = result.error;
            if failed {
                warn!(self.logger, "command failed";
                    "index" => index,
                    "action" => cmd.action.name(),
                    "message" => result.error_message.as_deref().unwrap_or("")
                );
            }
            results.push(result);

            // Later commands assume this one succeeded
            if failed {
                error = true;
                break;
            }
        }

        self.run_info = results.clone();
        PhaseReport { error, results }
    }

    async fn reverse_pass(&self, phase: Phase) -> PhaseReport {
        let mut indexed: Vec<IndexedResult> = Vec::new();
        let mut error = false;

        for (index, cmd) in self.plan.commands.iter().enumerate().rev() {
            // Cleanup targets are named by the command itself
            let prior = if phase == Phase::Cleanup {
                None
            } else {
                self.run_info.get(index)
            };

            let result = if self.is_local(cmd) {
                match phase {
                    Phase::Shutdown => self.actions.shutdown(cmd, prior).await,
                    Phase::Cleanup => self.actions.cleanup(cmd).await,
                    Phase::IsHealthy => self.actions.is_healthy(cmd, prior).await,
                    Phase::Launch | Phase::Relaunch => {
                        RunInfo::failed("launch is a forward pass")
                    }
                }
            } else {
                match self.relay_target(cmd) {
                    Some(target) => {
                        self.relay
                            .dispatch(&self.plan.dispatchers, target, phase, cmd, prior)
                            .await
                    }
                    None => RunInfo::failed("command references unknown dispatcher"),
                }
            };

            if result.error {
                warn!(self.logger, "command failed";
                    "index" => index,
                    "action" => cmd.action.name(),
                    "phase" => phase.name(),
                    "message" => result.error_message.as_deref().unwrap_or("")
                );
                error = true;
            }
            indexed.push(IndexedResult { index, result });
        }

        // Back to forward plan order
        indexed.sort_by_key(|entry| entry.index);

        PhaseReport {
            error,
            results: indexed.into_iter().map(|entry| entry.result).collect(),
        }
    }
}
