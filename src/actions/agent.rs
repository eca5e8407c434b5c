//! Lifecycle handlers for the agency ("agent") process.

use slog::{info, warn, Logger};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::process;
use crate::plan::{endpoint_host, DispatcherInfo, RunDetail, RunInfo, StartAgentData};

const DEFAULT_AGENT_BINARY: &str = "bin/agent";
const ALIVE_ATTEMPTS: u32 = 20;
const ALIVE_TICK: Duration = Duration::from_millis(500);

fn binary_path(data: &StartAgentData) -> PathBuf {
    if data.agent_path.is_empty() {
        PathBuf::from(DEFAULT_AGENT_BINARY)
    } else {
        PathBuf::from(&data.agent_path)
    }
}

fn data_dir(data: &StartAgentData) -> PathBuf {
    Path::new(&data.data_path).join(format!("agent-{}", data.ext_port))
}

fn log_file(data: &StartAgentData) -> PathBuf {
    Path::new(&data.data_path).join(format!("agent-{}.log", data.ext_port))
}

pub async fn launch(
    logger: &Logger,
    http: &reqwest::Client,
    local: &DispatcherInfo,
    data: &StartAgentData,
    is_relaunch: bool,
) -> RunInfo {
    let binary = binary_path(data);
    if !binary.exists() {
        return RunInfo::failed(format!("agent binary not found at {}", binary.display()));
    }

    let dir = data_dir(data);
    if !is_relaunch {
        if let Err(e) = process::wipe_dir(&dir).await {
            return RunInfo::failed(format!(
                "cannot wipe agent data directory {}: {}",
                dir.display(),
                e
            ));
        }
    }
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        return RunInfo::failed(format!(
            "cannot create agent data directory {}: {}",
            dir.display(),
            e
        ));
    }

    let host = endpoint_host(&local.endpoint);
    let bind = format!("{}:{}", host, data.ext_port);
    let peer_bind = format!("{}:{}", host, data.int_port);

    let mut args = vec![
        "--name".to_string(),
        local.id.clone(),
        "--data-dir".to_string(),
        dir.display().to_string(),
        "--bind-addr".to_string(),
        bind.clone(),
        "--peer-bind-addr".to_string(),
        peer_bind,
    ];
    if !data.peers.is_empty() {
        args.push("--peers".to_string());
        args.push(data.peers.join(","));
    }

    info!(logger, "starting agent";
        "binary" => %binary.display(),
        "bind" => &bind,
        "relaunch" => is_relaunch
    );

    let log_path = log_file(data);
    let pid = match process::spawn_detached(&binary, &args, Some(log_path.as_path())) {
        Ok(pid) => pid,
        Err(e) => return RunInfo::failed(format!("failed to start agent: {}", e)),
    };

    // The agent is up once its key space answers.
    let probe_url = format!("http://{}/v2/keys/", bind);
    for _ in 0..ALIVE_ATTEMPTS {
        tokio::time::sleep(ALIVE_TICK).await;
        match http.get(&probe_url).send().await {
            Ok(response) if response.status().is_success() => {
                tokio::time::sleep(ALIVE_TICK).await;
                let endpoint = format!("tcp://{}", bind);
                info!(logger, "agent is up"; "pid" => pid, "endpoint" => &endpoint);
                return RunInfo::ok(RunDetail::Agent { pid, endpoint });
            }
            _ => {}
        }
    }

    warn!(logger, "agent never answered"; "pid" => pid, "probe" => &probe_url);
    RunInfo::failed("agency did not come alive")
}

pub async fn shutdown(logger: &Logger, run: Option<&RunInfo>) -> RunInfo {
    if let Some(RunDetail::Agent { pid, .. }) = run.map(|r| &r.detail) {
        info!(logger, "stopping agent"; "pid" => *pid);
        process::terminate(*pid);
    }
    RunInfo::ok(RunDetail::None)
}

pub async fn cleanup(data: &StartAgentData) -> RunInfo {
    let dir = data_dir(data);
    if let Err(e) = process::wipe_dir(&dir).await {
        return RunInfo::failed(format!(
            "cannot remove agent data directory {}: {}",
            dir.display(),
            e
        ));
    }
    if let Err(e) = process::wipe_file(&log_file(data)).await {
        return RunInfo::failed(format!("cannot remove agent log file: {}", e));
    }
    RunInfo::ok(RunDetail::None)
}

pub fn is_healthy(run: Option<&RunInfo>) -> RunInfo {
    match run.map(|r| &r.detail) {
        Some(RunDetail::Agent { pid, .. }) => RunInfo::ok(RunDetail::Liveness {
            running: vec![process::is_alive(*pid)],
        }),
        _ => RunInfo::ok(RunDetail::None),
    }
}
