//! Client side of remote command routing.
//!
//! A command owned by another dispatcher is wrapped into a one-command
//! plan and POSTed to that host's dispatch endpoint. Failures come back
//! as error envelopes, never as panics or transport exceptions.

use slog::{debug, warn, Logger};
use std::collections::HashMap;
use std::time::Duration;

use super::messages::{DispatchRequest, DispatchResponse, Phase};
use crate::plan::{endpoint_to_url, ClusterCommand, ClusterPlan, DispatcherInfo, RunInfo};

/// Path every dispatcher serves relayed commands on.
pub const DISPATCH_PATH: &str = "/_admin/clusterDispatch";

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP client for forwarding commands to peer dispatchers.
pub struct DispatchRelay {
    client: reqwest::Client,
    logger: Logger,
}

impl DispatchRelay {
    pub fn new(logger: Logger) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, logger }
    }

    /// Forward one command to the dispatcher that owns it and unwrap the
    /// single result the remote kickstarter produced for it.
    pub async fn dispatch(
        &self,
        dispatchers: &HashMap<String, DispatcherInfo>,
        target: &DispatcherInfo,
        phase: Phase,
        cmd: &ClusterCommand,
        run: Option<&RunInfo>,
    ) -> RunInfo {
        let request = DispatchRequest {
            action: phase,
            cluster_plan: ClusterPlan {
                dispatchers: dispatchers.clone(),
                commands: vec![cmd.clone()],
            },
            run_info: run.map(|r| vec![r.clone()]),
            myname: target.id.clone(),
        };

        let url = format!("{}{}", endpoint_to_url(&target.endpoint), DISPATCH_PATH);
        debug!(self.logger, "relaying command";
            "url" => &url,
            "action" => cmd.action.name(),
            "phase" => phase.name()
        );

        let mut builder = self.client.post(&url).json(&request);
        if let Some(username) = &target.username {
            builder = builder.basic_auth(username, target.passwd.as_deref());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(self.logger, "dispatch request failed"; "url" => &url, "error" => %e);
                return RunInfo::failed(format!("dispatch request failed: {}", e));
            }
        };

        if response.status().as_u16() != 200 {
            warn!(self.logger, "dispatch rejected";
                "url" => &url,
                "status" => response.status().as_u16()
            );
            return RunInfo::failed("bad HTTP response code");
        }

        let parsed: DispatchResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(self.logger, "dispatch response unparseable"; "url" => &url, "error" => %e);
                return RunInfo::failed("invalid JSON in dispatch response");
            }
        };

        let results = if phase.is_launch_family() {
            parsed.run_info
        } else {
            parsed.results
        };

        match results {
            Some(mut list) if !list.is_empty() => list.remove(0),
            _ if parsed.error => RunInfo::failed(
                parsed
                    .error_message
                    .unwrap_or_else(|| "dispatch failed remotely".to_string()),
            ),
            _ => RunInfo::failed("dispatch response carried no result"),
        }
    }
}
