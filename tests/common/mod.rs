#![allow(dead_code)]

use async_trait::async_trait;
use clusterboot::plan::{
    ClusterCommand, ClusterPlan, CommandAction, DispatcherInfo, RunDetail, RunInfo, StartAgentData,
};
use clusterboot::CommandActions;
use std::sync::Mutex;

pub fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

/// One recorded handler invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub phase: &'static str,
    pub marker: u16,
    pub prior_pid: Option<u32>,
}

/// Scripted stand-in for the real process actions. Commands are told apart
/// by the agent ext port, which doubles as the reported pid.
#[derive(Default)]
pub struct ScriptedActions {
    pub fail_launch: Vec<u16>,
    pub fail_shutdown: Vec<u16>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedActions {
    pub fn recording() -> Self {
        Self::default()
    }

    pub fn failing_launch(markers: Vec<u16>) -> Self {
        Self {
            fail_launch: markers,
            ..Self::default()
        }
    }

    pub fn failing_shutdown(markers: Vec<u16>) -> Self {
        Self {
            fail_shutdown: markers,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn calls_in_phase(&self, phase: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.phase == phase)
            .collect()
    }

    fn record(&self, phase: &'static str, marker: u16, prior_pid: Option<u32>) {
        self.calls.lock().expect("calls lock poisoned").push(Call {
            phase,
            marker,
            prior_pid,
        });
    }
}

pub fn marker_of(cmd: &ClusterCommand) -> u16 {
    match &cmd.action {
        CommandAction::StartAgent(data) => data.ext_port,
        _ => 0,
    }
}

fn prior_pid_of(run: Option<&RunInfo>) -> Option<u32> {
    match run.map(|r| &r.detail) {
        Some(RunDetail::Agent { pid, .. }) => Some(*pid),
        _ => None,
    }
}

#[async_trait]
impl CommandActions for ScriptedActions {
    async fn launch(
        &self,
        _local: &DispatcherInfo,
        cmd: &ClusterCommand,
        is_relaunch: bool,
    ) -> RunInfo {
        let marker = marker_of(cmd);
        self.record(if is_relaunch { "relaunch" } else { "launch" }, marker, None);
        if self.fail_launch.contains(&marker) {
            RunInfo::failed("scripted launch failure")
        } else {
            RunInfo::ok(RunDetail::Agent {
                pid: marker as u32,
                endpoint: format!("tcp://127.0.0.1:{}", marker),
            })
        }
    }

    async fn shutdown(&self, cmd: &ClusterCommand, run: Option<&RunInfo>) -> RunInfo {
        let marker = marker_of(cmd);
        self.record("shutdown", marker, prior_pid_of(run));
        if self.fail_shutdown.contains(&marker) {
            RunInfo::failed("scripted shutdown failure")
        } else {
            RunInfo::ok(RunDetail::None)
        }
    }

    async fn cleanup(&self, cmd: &ClusterCommand) -> RunInfo {
        self.record("cleanup", marker_of(cmd), None);
        RunInfo::ok(RunDetail::None)
    }

    async fn is_healthy(&self, cmd: &ClusterCommand, run: Option<&RunInfo>) -> RunInfo {
        self.record("isHealthy", marker_of(cmd), prior_pid_of(run));
        RunInfo::ok(RunDetail::Liveness {
            running: vec![true],
        })
    }
}

pub fn dispatcher(id: &str, endpoint: &str) -> DispatcherInfo {
    DispatcherInfo {
        id: id.to_string(),
        endpoint: endpoint.to_string(),
        username: None,
        passwd: None,
        server_args: Vec::new(),
    }
}

pub fn agent_command(marker: u16, owner: Option<&str>) -> ClusterCommand {
    ClusterCommand {
        dispatcher: owner.map(|id| id.to_string()),
        action: CommandAction::StartAgent(StartAgentData {
            ext_port: marker,
            int_port: marker + 1000,
            peers: Vec::new(),
            agent_path: String::new(),
            data_path: "/tmp/unused".to_string(),
        }),
    }
}

pub fn plan_of(dispatchers: Vec<DispatcherInfo>, commands: Vec<ClusterCommand>) -> ClusterPlan {
    ClusterPlan {
        dispatchers: dispatchers
            .into_iter()
            .map(|info| (info.id.clone(), info))
            .collect(),
        commands,
    }
}
