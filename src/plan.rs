//! Cluster plan types: dispatcher table, command list, and run results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A physical or logical host capable of spawning cluster processes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherInfo {
    pub id: String,

    /// Transport endpoint of the host's dispatch server, e.g. "tcp://192.168.1.10:8529"
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,

    /// Extra arguments appended to every worker process started on this host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_args: Vec<String>,
}

/// Agency connection details carried inside commands that talk to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyInfo {
    /// Key prefix under which the cluster configuration lives
    pub prefix: String,

    /// Client endpoints of the agency, e.g. ["tcp://127.0.0.1:4001"]
    pub endpoints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAgentData {
    /// Port the agency serves reads and writes on
    pub ext_port: u16,

    /// Port for agency-internal peer traffic
    pub int_port: u16,

    /// Peer addresses of agents started before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<String>,

    /// Path to the agent binary; empty selects the built-in default
    #[serde(default)]
    pub agent_path: String,

    /// Root directory under which the agent's data directory is created
    pub data_path: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConfigurationData {
    pub agency: AgencyInfo,

    /// Nested configuration tree; leaves are JSON-encoded strings
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartServersData {
    pub agency: AgencyInfo,

    /// Root directory for per-server data directories
    pub data_path: String,

    /// Root directory for per-server log files
    pub log_path: String,

    /// Directory holding the role-specific configuration files; empty selects the default
    #[serde(default)]
    pub config_path: String,

    /// Path to the worker binary; empty selects the built-in default
    #[serde(default)]
    pub server_path: String,

    /// Extra arguments appended to every worker started by this command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSystemCollsData {
    /// URL of the coordinator that runs the bootstrap
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,
}

/// The action a command performs, tagged by name on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CommandAction {
    StartAgent(StartAgentData),
    SendConfiguration(SendConfigurationData),
    StartServers(StartServersData),
    CreateSystemColls(CreateSystemCollsData),
}

impl CommandAction {
    pub fn name(&self) -> &'static str {
        match self {
            CommandAction::StartAgent(_) => "startAgent",
            CommandAction::SendConfiguration(_) => "sendConfiguration",
            CommandAction::StartServers(_) => "startServers",
            CommandAction::CreateSystemColls(_) => "createSystemColls",
        }
    }
}

/// One step of a cluster plan.
///
/// A missing `dispatcher`, or one equal to the local identity, means the
/// command executes on this host; anything else is relayed to its owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<String>,

    #[serde(flatten)]
    pub action: CommandAction,
}

/// Dispatcher table plus ordered command list.
///
/// Command order is significant: it encodes the startup dependency chain
/// (agent before configuration before servers before bootstrap) and is
/// walked in reverse for teardown and inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPlan {
    pub dispatchers: HashMap<String, DispatcherInfo>,
    pub commands: Vec<ClusterCommand>,
}

impl ClusterPlan {
    /// Check that every dispatcher reference resolves against the table.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (key, info) in &self.dispatchers {
            if key != &info.id {
                return Err(PlanError::MismatchedDispatcherId {
                    key: key.clone(),
                    id: info.id.clone(),
                });
            }
        }
        for cmd in &self.commands {
            if let Some(id) = &cmd.dispatcher {
                if !self.dispatchers.contains_key(id) {
                    return Err(PlanError::UnknownDispatcher { id: id.clone() });
                }
            }
        }
        Ok(())
    }
}

/// Errors detected while validating a plan.
#[derive(Debug, Clone)]
pub enum PlanError {
    /// A command references a dispatcher id missing from the table
    UnknownDispatcher { id: String },

    /// A dispatcher table entry is stored under a key that differs from its id
    MismatchedDispatcherId { key: String, id: String },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::UnknownDispatcher { id } => {
                write!(f, "Command references unknown dispatcher {}", id)
            }
            PlanError::MismatchedDispatcherId { key, id } => {
                write!(f, "Dispatcher {} is stored under key {}", id, key)
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Role of a worker process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    DbServer,
    Coordinator,
}

impl ServerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::DbServer => "dbserver",
            ServerRole::Coordinator => "coordinator",
        }
    }
}

/// Action-specific payload of a run result.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunDetail {
    #[default]
    None,
    Agent {
        pid: u32,
        endpoint: String,
    },
    Servers {
        pids: Vec<u32>,
        endpoints: Vec<String>,
        roles: Vec<ServerRole>,
    },
    Bootstrap {
        response: serde_json::Value,
    },
    Liveness {
        running: Vec<bool>,
    },
}

/// Uniform result envelope of every lifecycle operation.
///
/// Failures are reported here, never thrown: a handler that cannot do its
/// work answers with `error: true` and a message, and the engine aggregates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(flatten)]
    pub detail: RunDetail,
}

impl RunInfo {
    pub fn ok(detail: RunDetail) -> Self {
        Self {
            error: false,
            error_message: None,
            detail,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: true,
            error_message: Some(message.into()),
            detail: RunDetail::None,
        }
    }

    /// Failure that still carries partial results, e.g. pids spawned before the error.
    pub fn failed_with(message: impl Into<String>, detail: RunDetail) -> Self {
        Self {
            error: true,
            error_message: Some(message.into()),
            detail,
        }
    }
}

/// Translate a transport endpoint into a URL ("tcp://" to "http://", "ssl://" to "https://").
pub fn endpoint_to_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("tcp://") {
        format!("http://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("ssl://") {
        format!("https://{}", rest)
    } else {
        endpoint.to_string()
    }
}

/// Host part of a transport endpoint, without scheme or port.
pub fn endpoint_host(endpoint: &str) -> String {
    let rest = match endpoint.split_once("://") {
        Some((_, rest)) => rest,
        None => endpoint,
    };
    match rest.rsplit_once(':') {
        Some((host, _)) => host.to_string(),
        None => rest.to_string(),
    }
}
