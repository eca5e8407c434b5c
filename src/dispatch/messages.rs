//! JSON messages exchanged with peer dispatchers.

use serde::{Deserialize, Serialize};

use crate::plan::{ClusterPlan, RunInfo};

/// Lifecycle phase selector carried in a dispatch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Launch,
    Relaunch,
    Shutdown,
    Cleanup,
    IsHealthy,
}

impl Phase {
    /// Phases whose results travel as a launch-style `runInfo` list.
    pub fn is_launch_family(self) -> bool {
        matches!(self, Phase::Launch | Phase::Relaunch)
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Launch => "launch",
            Phase::Relaunch => "relaunch",
            Phase::Shutdown => "shutdown",
            Phase::Cleanup => "cleanup",
            Phase::IsHealthy => "isHealthy",
        }
    }
}

/// One relayed command: a single-command plan plus the identity the remote
/// kickstarter must assume.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub action: Phase,

    pub cluster_plan: ClusterPlan,

    /// Prior launch result for the relayed command (shutdown family only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_info: Option<Vec<RunInfo>>,

    pub myname: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Results of a launch or relaunch request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_info: Option<Vec<RunInfo>>,

    /// Results of a shutdown, cleanup or isHealthy request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RunInfo>>,
}

/// Health check response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ClusterCommand, CommandAction, CreateSystemCollsData, RunDetail};
    use std::collections::HashMap;

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(serde_json::to_value(Phase::Launch).unwrap(), "launch");
        assert_eq!(serde_json::to_value(Phase::IsHealthy).unwrap(), "isHealthy");

        let recovered: Phase = serde_json::from_str("\"isHealthy\"").unwrap();
        assert_eq!(recovered, Phase::IsHealthy);
    }

    #[test]
    fn test_dispatch_request_round_trip() {
        let request = DispatchRequest {
            action: Phase::Shutdown,
            cluster_plan: ClusterPlan {
                dispatchers: HashMap::new(),
                commands: vec![ClusterCommand {
                    dispatcher: Some("d2".to_string()),
                    action: CommandAction::CreateSystemColls(CreateSystemCollsData {
                        url: "http://h2:8530".to_string(),
                        username: None,
                        passwd: None,
                    }),
                }],
            },
            run_info: Some(vec![RunInfo::ok(RunDetail::None)]),
            myname: "d2".to_string(),
        };

        let json = serde_json::to_string(&request).expect("Failed to serialize request");
        assert!(json.contains("\"action\":\"shutdown\""));
        assert!(json.contains("\"clusterPlan\""));
        assert!(json.contains("\"myname\":\"d2\""));

        let recovered: DispatchRequest =
            serde_json::from_str(&json).expect("Failed to deserialize request");
        assert_eq!(recovered.action, Phase::Shutdown);
        assert_eq!(recovered.cluster_plan.commands.len(), 1);
        assert_eq!(recovered.run_info.map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_dispatch_response_omits_empty_fields() {
        let response = DispatchResponse {
            error: false,
            error_message: None,
            run_info: Some(vec![RunInfo::ok(RunDetail::None)]),
            results: None,
        };

        let json = serde_json::to_string(&response).expect("Failed to serialize response");
        assert!(json.contains("\"runInfo\""));
        assert!(!json.contains("\"results\""));
        assert!(!json.contains("\"errorMessage\""));
    }
}
