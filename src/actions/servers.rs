//! Lifecycle handlers for the worker processes (data servers and coordinators).

use serde::Deserialize;
use slog::{debug, info, Logger};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::process;
use crate::agency::AgencyClient;
use crate::plan::{
    endpoint_host, endpoint_to_url, DispatcherInfo, RunDetail, RunInfo, ServerRole,
    StartServersData,
};

const DEFAULT_SERVER_BINARY: &str = "bin/clusterd";
const DEFAULT_CONFIG_DIR: &str = "etc";
const SETTLE_WAIT: Duration = Duration::from_secs(3);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Entry under Dispatcher/Launchers/<id> naming the servers this host runs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LauncherEntry {
    #[serde(default)]
    db_servers: Vec<String>,
    #[serde(default)]
    coordinators: Vec<String>,
}

fn binary_path(data: &StartServersData) -> PathBuf {
    if data.server_path.is_empty() {
        PathBuf::from(DEFAULT_SERVER_BINARY)
    } else {
        PathBuf::from(&data.server_path)
    }
}

fn config_dir(data: &StartServersData) -> PathBuf {
    if data.config_path.is_empty() {
        PathBuf::from(DEFAULT_CONFIG_DIR)
    } else {
        PathBuf::from(&data.config_path)
    }
}

fn server_log_file(data: &StartServersData, id: &str) -> PathBuf {
    Path::new(&data.log_path).join(format!("log-{}", id))
}

fn server_data_dir(data: &StartServersData, id: &str) -> PathBuf {
    Path::new(&data.data_path).join(format!("data-{}", id))
}

pub async fn launch(
    logger: &Logger,
    local: &DispatcherInfo,
    data: &StartServersData,
    is_relaunch: bool,
) -> RunInfo {
    let binary = binary_path(data);
    if !binary.exists() {
        return RunInfo::failed(format!("server binary not found at {}", binary.display()));
    }

    let agency_endpoint = match data.agency.endpoints.first() {
        Some(endpoint) => endpoint.clone(),
        None => return RunInfo::failed("agency has no endpoints"),
    };
    let agency = AgencyClient::new(&agency_endpoint, &data.agency.prefix, logger.clone());

    // The configuration pushed earlier names the servers this host launches.
    let launcher_path = format!("Dispatcher/Launchers/{}", local.id);
    let launcher: LauncherEntry = match agency.get(&launcher_path).await {
        Ok(value) => match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                return RunInfo::failed(format!("launcher entry for {} is malformed: {}", local.id, e))
            }
        },
        Err(e) => {
            return RunInfo::failed(format!("cannot read launcher entry for {}: {}", local.id, e))
        }
    };

    let identities: Vec<(String, ServerRole)> = launcher
        .db_servers
        .iter()
        .map(|id| (id.clone(), ServerRole::DbServer))
        .chain(
            launcher
                .coordinators
                .iter()
                .map(|id| (id.clone(), ServerRole::Coordinator)),
        )
        .collect();

    info!(logger, "starting servers";
        "dispatcher" => &local.id,
        "count" => identities.len(),
        "relaunch" => is_relaunch
    );

    let mut pids: Vec<u32> = Vec::new();
    let mut endpoints: Vec<String> = Vec::new();
    let mut roles: Vec<ServerRole> = Vec::new();

    for (id, role) in identities {
        let endpoint_path = format!("Target/MapIDToEndpoint/{}", id);
        let endpoint = match agency.get(&endpoint_path).await {
            Ok(value) => match value.as_str() {
                Some(endpoint) => endpoint.to_string(),
                None => {
                    return RunInfo::failed_with(
                        format!("endpoint for {} is not a string", id),
                        RunDetail::Servers {
                            pids,
                            endpoints,
                            roles,
                        },
                    )
                }
            },
            Err(e) => {
                return RunInfo::failed_with(
                    format!("cannot resolve endpoint for {}: {}", id, e),
                    RunDetail::Servers {
                        pids,
                        endpoints,
                        roles,
                    },
                )
            }
        };

        let log_file = server_log_file(data, &id);
        let data_dir = server_data_dir(data, &id);
        if !is_relaunch {
            if let Err(e) = process::wipe_file(&log_file).await {
                return RunInfo::failed_with(
                    format!("cannot wipe log file for {}: {}", id, e),
                    RunDetail::Servers {
                        pids,
                        endpoints,
                        roles,
                    },
                );
            }
            if let Err(e) = process::wipe_dir(&data_dir).await {
                return RunInfo::failed_with(
                    format!("cannot wipe data directory for {}: {}", id, e),
                    RunDetail::Servers {
                        pids,
                        endpoints,
                        roles,
                    },
                );
            }
        }
        if let Err(e) = tokio::fs::create_dir_all(&data_dir).await {
            return RunInfo::failed_with(
                format!("cannot create data directory for {}: {}", id, e),
                RunDetail::Servers {
                    pids,
                    endpoints,
                    roles,
                },
            );
        }

        let args = build_args(
            data,
            local,
            role,
            &id,
            &endpoint,
            &agency_endpoint,
            &log_file,
            &data_dir,
        );

        debug!(logger, "spawning server";
            "id" => &id,
            "role" => role.as_str(),
            "endpoint" => &endpoint
        );

        match process::spawn_detached(&binary, &args, None) {
            Ok(pid) => {
                pids.push(pid);
                endpoints.push(endpoint);
                roles.push(role);
            }
            Err(e) => {
                return RunInfo::failed_with(
                    format!("failed to start {}: {}", id, e),
                    RunDetail::Servers {
                        pids,
                        endpoints,
                        roles,
                    },
                )
            }
        }
    }

    tokio::time::sleep(SETTLE_WAIT).await;

    RunInfo::ok(RunDetail::Servers {
        pids,
        endpoints,
        roles,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_args(
    data: &StartServersData,
    local: &DispatcherInfo,
    role: ServerRole,
    id: &str,
    endpoint: &str,
    agency_endpoint: &str,
    log_file: &Path,
    data_dir: &Path,
) -> Vec<String> {
    let config_file = config_dir(data).join(format!("{}.conf", role.as_str()));
    let bind = format!("{}:{}", endpoint_host(endpoint), endpoint_port(endpoint));

    let mut args = vec![
        "--config".to_string(),
        config_file.display().to_string(),
        "--server.dispatcher".to_string(),
        "false".to_string(),
        "--server.frontend".to_string(),
        "false".to_string(),
        "--cluster.my-id".to_string(),
        id.to_string(),
        "--cluster.agency-prefix".to_string(),
        data.agency.prefix.clone(),
        "--cluster.agency-endpoint".to_string(),
        agency_endpoint.to_string(),
        "--server.endpoint".to_string(),
        bind,
        "--log.file".to_string(),
        log_file.display().to_string(),
        "--database.directory".to_string(),
        data_dir.display().to_string(),
    ];
    args.extend(data.extra_args.iter().cloned());
    args.extend(local.server_args.iter().cloned());
    args
}

fn endpoint_port(endpoint: &str) -> String {
    let rest = match endpoint.split_once("://") {
        Some((_, rest)) => rest,
        None => endpoint,
    };
    match rest.rsplit_once(':') {
        Some((_, port)) => port.to_string(),
        None => String::new(),
    }
}

pub async fn shutdown(logger: &Logger, http: &reqwest::Client, run: Option<&RunInfo>) -> RunInfo {
    let (pids, endpoints) = match run.map(|r| &r.detail) {
        Some(RunDetail::Servers {
            pids, endpoints, ..
        }) => (pids, endpoints),
        _ => return RunInfo::ok(RunDetail::None),
    };

    // Ask nicely first; the kill below is what actually ends the processes.
    for endpoint in endpoints {
        let url = format!("{}/_admin/shutdown", endpoint_to_url(endpoint));
        debug!(logger, "requesting graceful shutdown"; "url" => &url);
        let _ = http.get(&url).send().await;
    }

    tokio::time::sleep(SHUTDOWN_GRACE).await;

    for pid in pids {
        info!(logger, "killing server"; "pid" => *pid);
        process::force_kill(*pid);
    }

    RunInfo::ok(RunDetail::None)
}

pub async fn cleanup(data: &StartServersData) -> RunInfo {
    if let Err(e) = remove_matching(Path::new(&data.data_path), "data-").await {
        return RunInfo::failed(format!("cannot clean data directories: {}", e));
    }
    if let Err(e) = remove_matching(Path::new(&data.log_path), "log-").await {
        return RunInfo::failed(format!("cannot clean log files: {}", e));
    }
    RunInfo::ok(RunDetail::None)
}

/// Remove every entry under `root` whose name starts with `prefix`.
async fn remove_matching(root: &Path, prefix: &str) -> std::io::Result<()> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }

    Ok(())
}

pub fn is_healthy(run: Option<&RunInfo>) -> RunInfo {
    match run.map(|r| &r.detail) {
        Some(RunDetail::Servers { pids, .. }) => RunInfo::ok(RunDetail::Liveness {
            running: pids.iter().map(|pid| process::is_alive(*pid)).collect(),
        }),
        _ => RunInfo::ok(RunDetail::None),
    }
}
