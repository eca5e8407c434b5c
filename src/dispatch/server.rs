//! HTTP endpoint that executes relayed commands on behalf of peers.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use slog::{debug, error, info, Logger};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::messages::{DispatchRequest, DispatchResponse, HealthResponse, Phase};
use super::relay::DISPATCH_PATH;
use crate::actions::CommandActions;
use crate::kickstarter::Kickstarter;

/// Serves the dispatch endpoint of one host.
#[derive(Clone)]
pub struct DispatchServer {
    actions: Arc<dyn CommandActions>,
    address: SocketAddr,
    logger: Logger,
}

impl DispatchServer {
    pub fn new(address: SocketAddr, actions: Arc<dyn CommandActions>, logger: Logger) -> Self {
        Self {
            actions,
            address,
            logger,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(DISPATCH_PATH, post(handle_dispatch))
            .route("/health", get(handle_health))
            .layer(CorsLayer::permissive())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        info!(self.logger, "starting dispatch server"; "address" => %self.address);

        let listener = tokio::net::TcpListener::bind(self.address)
            .await
            .map_err(|e| {
                error!(self.logger, "failed to bind dispatch server"; "error" => %e);
                e
            })?;

        let router = self.router();
        axum::serve(listener, router).await.map_err(|e| {
            error!(self.logger, "dispatch server error"; "error" => %e);
            e
        })?;

        Ok(())
    }
}

/// Execute a relayed command with a kickstarter bound to the requested identity.
async fn handle_dispatch(
    State(server): State<DispatchServer>,
    Json(request): Json<DispatchRequest>,
) -> Json<DispatchResponse> {
    debug!(server.logger, "dispatch request";
        "action" => request.action.name(),
        "myname" => &request.myname,
        "commands" => request.cluster_plan.commands.len()
    );

    let mut kickstarter = match Kickstarter::with_actions(
        request.cluster_plan,
        request.myname,
        server.actions.clone(),
        server.logger.clone(),
    ) {
        Ok(kickstarter) => kickstarter,
        Err(e) => {
            error!(server.logger, "relayed plan rejected"; "error" => %e);
            return Json(DispatchResponse {
                error: true,
                error_message: Some(e.to_string()),
                run_info: None,
                results: None,
            });
        }
    };

    if let Some(run_info) = request.run_info {
        kickstarter.set_run_info(run_info);
    }

    let report = match request.action {
        Phase::Launch => kickstarter.launch().await,
        Phase::Relaunch => kickstarter.relaunch().await,
        Phase::Shutdown => kickstarter.shutdown().await,
        Phase::Cleanup => kickstarter.cleanup().await,
        Phase::IsHealthy => kickstarter.is_healthy().await,
    };

    let (run_info, results) = if request.action.is_launch_family() {
        (Some(report.results), None)
    } else {
        (None, Some(report.results))
    };

    Json(DispatchResponse {
        error: report.error,
        error_message: None,
        run_info,
        results,
    })
}

async fn handle_health(State(server): State<DispatchServer>) -> Json<HealthResponse> {
    debug!(server.logger, "health check");
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
