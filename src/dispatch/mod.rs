//! Location-transparent command routing between dispatcher hosts.

pub mod messages;
pub mod relay;
pub mod server;

pub use messages::{DispatchRequest, DispatchResponse, Phase};
pub use relay::{DispatchRelay, DISPATCH_PATH};
pub use server::DispatchServer;
