pub mod actions;
pub mod agency;
pub mod dispatch;
pub mod kickstarter;
pub mod plan;

pub use actions::{CommandActions, LocalActions};
pub use agency::{AgencyClient, AgencyError};
pub use dispatch::{DispatchRelay, DispatchServer, Phase, DISPATCH_PATH};
pub use kickstarter::{Kickstarter, PhaseReport};
pub use plan::{
    ClusterCommand, ClusterPlan, CommandAction, DispatcherInfo, PlanError, RunDetail, RunInfo,
    ServerRole,
};
