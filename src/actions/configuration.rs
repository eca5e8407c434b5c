//! Lifecycle handlers for pushing the cluster configuration into the agency.

use slog::{info, Logger};
use std::time::Duration;

use crate::agency::AgencyClient;
use crate::plan::{RunDetail, RunInfo, SendConfigurationData};

const RELAUNCH_WAIT: Duration = Duration::from_secs(1);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

pub async fn launch(logger: &Logger, data: &SendConfigurationData, is_relaunch: bool) -> RunInfo {
    if is_relaunch {
        // The store already holds the configuration from the previous run.
        tokio::time::sleep(RELAUNCH_WAIT).await;
        return RunInfo::ok(RunDetail::None);
    }

    let endpoint = match data.agency.endpoints.first() {
        Some(endpoint) => endpoint,
        None => return RunInfo::failed("agency has no endpoints"),
    };

    info!(logger, "sending configuration to agency";
        "endpoint" => endpoint,
        "prefix" => &data.agency.prefix
    );

    let agency = AgencyClient::new(endpoint, &data.agency.prefix, logger.clone());
    match agency.put_tree("", &data.data).await {
        Ok(()) => RunInfo::ok(RunDetail::None),
        Err(e) => RunInfo::failed(format!("failed to push configuration: {}", e)),
    }
}

pub async fn shutdown() -> RunInfo {
    tokio::time::sleep(SHUTDOWN_WAIT).await;
    RunInfo::ok(RunDetail::None)
}
