//! Per-lifecycle-phase handlers for the cluster process categories.
//!
//! Each command category has handlers for the phases it participates in;
//! a phase with no work for a command answers with an empty success, so
//! that e.g. creating the system collections has no teardown counterpart.

mod agent;
mod bootstrap;
mod configuration;
mod process;
mod servers;

use async_trait::async_trait;
use slog::Logger;
use std::time::Duration;

use crate::plan::{ClusterCommand, CommandAction, DispatcherInfo, RunDetail, RunInfo};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Handlers for one command across the four lifecycle phases.
///
/// An implementation is constructed once and handed to the Kickstarter,
/// which routes every locally-owned command through it.
#[async_trait]
pub trait CommandActions: Send + Sync {
    /// Start the processes a command describes. `is_relaunch` preserves
    /// on-disk state instead of wiping it.
    async fn launch(
        &self,
        local: &DispatcherInfo,
        cmd: &ClusterCommand,
        is_relaunch: bool,
    ) -> RunInfo;

    /// Stop the processes recorded in `run`, forcefully if need be.
    async fn shutdown(&self, cmd: &ClusterCommand, run: Option<&RunInfo>) -> RunInfo;

    /// Remove the on-disk state a command's processes left behind.
    async fn cleanup(&self, cmd: &ClusterCommand) -> RunInfo;

    /// Report liveness of the processes recorded in `run` without touching them.
    async fn is_healthy(&self, cmd: &ClusterCommand, run: Option<&RunInfo>) -> RunInfo;
}

/// Production implementation backed by real processes and HTTP calls.
pub struct LocalActions {
    http: reqwest::Client,
    logger: Logger,
}

impl LocalActions {
    pub fn new(logger: Logger) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { http, logger }
    }
}

#[async_trait]
impl CommandActions for LocalActions {
    async fn launch(
        &self,
        local: &DispatcherInfo,
        cmd: &ClusterCommand,
        is_relaunch: bool,
    ) -> RunInfo {
        match &cmd.action {
            CommandAction::StartAgent(data) => {
                agent::launch(&self.logger, &self.http, local, data, is_relaunch).await
            }
            CommandAction::SendConfiguration(data) => {
                configuration::launch(&self.logger, data, is_relaunch).await
            }
            CommandAction::StartServers(data) => {
                servers::launch(&self.logger, local, data, is_relaunch).await
            }
            CommandAction::CreateSystemColls(data) => {
                bootstrap::launch(&self.logger, &self.http, data).await
            }
        }
    }

    async fn shutdown(&self, cmd: &ClusterCommand, run: Option<&RunInfo>) -> RunInfo {
        match &cmd.action {
            CommandAction::StartAgent(_) => agent::shutdown(&self.logger, run).await,
            CommandAction::SendConfiguration(_) => configuration::shutdown().await,
            CommandAction::StartServers(_) => {
                servers::shutdown(&self.logger, &self.http, run).await
            }
            CommandAction::CreateSystemColls(_) => RunInfo::ok(RunDetail::None),
        }
    }

    async fn cleanup(&self, cmd: &ClusterCommand) -> RunInfo {
        match &cmd.action {
            CommandAction::StartAgent(data) => agent::cleanup(data).await,
            CommandAction::StartServers(data) => servers::cleanup(data).await,
            _ => RunInfo::ok(RunDetail::None),
        }
    }

    async fn is_healthy(&self, cmd: &ClusterCommand, run: Option<&RunInfo>) -> RunInfo {
        match &cmd.action {
            CommandAction::StartAgent(_) => agent::is_healthy(run),
            CommandAction::StartServers(_) => servers::is_healthy(run),
            _ => RunInfo::ok(RunDetail::None),
        }
    }
}
