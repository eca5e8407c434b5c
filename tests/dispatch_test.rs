mod common;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use clusterboot::plan::RunDetail;
use clusterboot::{DispatchServer, Kickstarter, DISPATCH_PATH};
use common::{agent_command, dispatcher, plan_of, test_logger, ScriptedActions};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn_router(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });
    addr
}

async fn spawn_dispatch_server(actions: Arc<ScriptedActions>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let server = DispatchServer::new(addr, actions, test_logger());
    let router = server.router();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Dispatch server failed");
    });
    addr
}

fn all_remote_plan(addr: SocketAddr) -> clusterboot::ClusterPlan {
    plan_of(
        vec![
            dispatcher("me", "tcp://127.0.0.1:8529"),
            dispatcher("remote", &format!("tcp://{}", addr)),
        ],
        vec![
            agent_command(1, Some("remote")),
            agent_command(2, Some("remote")),
            agent_command(3, Some("remote")),
        ],
    )
}

#[tokio::test]
async fn test_relayed_launch_matches_local_shape() {
    let remote_actions = Arc::new(ScriptedActions::recording());
    let addr = spawn_dispatch_server(remote_actions.clone()).await;

    let local_actions = Arc::new(ScriptedActions::recording());
    let mut kickstarter = Kickstarter::with_actions(
        all_remote_plan(addr),
        "me",
        local_actions.clone(),
        test_logger(),
    )
    .expect("Plan should validate");

    let report = kickstarter.launch().await;

    // Aggregation is identical to an all-local run
    assert!(!report.error);
    assert_eq!(report.results.len(), 3);
    for result in &report.results {
        assert!(matches!(result.detail, RunDetail::Agent { .. }));
    }

    // Everything ran on the peer, nothing here
    assert!(local_actions.calls().is_empty());
    assert_eq!(remote_actions.calls_in_phase("launch").len(), 3);
}

#[tokio::test]
async fn test_relayed_shutdown_carries_run_info() {
    let remote_actions = Arc::new(ScriptedActions::recording());
    let addr = spawn_dispatch_server(remote_actions.clone()).await;

    let mut kickstarter = Kickstarter::with_actions(
        all_remote_plan(addr),
        "me",
        Arc::new(ScriptedActions::recording()),
        test_logger(),
    )
    .expect("Plan should validate");

    let launch = kickstarter.launch().await;
    assert!(!launch.error);

    let report = kickstarter.shutdown().await;
    assert!(!report.error);
    assert_eq!(report.results.len(), 3);

    // The launch result crossed the wire back into each shutdown call
    let shutdowns = remote_actions.calls_in_phase("shutdown");
    assert_eq!(shutdowns.len(), 3);
    for call in shutdowns {
        assert_eq!(call.prior_pid, Some(call.marker as u32));
    }
}

#[tokio::test]
async fn test_relayed_launch_failure_stops_the_pass() {
    let remote_actions = Arc::new(ScriptedActions::failing_launch(vec![2]));
    let addr = spawn_dispatch_server(remote_actions.clone()).await;

    let mut kickstarter = Kickstarter::with_actions(
        all_remote_plan(addr),
        "me",
        Arc::new(ScriptedActions::recording()),
        test_logger(),
    )
    .expect("Plan should validate");

    let report = kickstarter.launch().await;

    assert!(report.error);
    assert_eq!(report.results.len(), 2);
    assert_eq!(
        report.results[1].error_message.as_deref(),
        Some("scripted launch failure")
    );
    assert_eq!(remote_actions.calls_in_phase("launch").len(), 2);
}

#[tokio::test]
async fn test_bad_status_maps_to_error_envelope() {
    let router = Router::new().route(
        DISPATCH_PATH,
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let addr = spawn_router(router).await;

    let mut kickstarter = Kickstarter::with_actions(
        all_remote_plan(addr),
        "me",
        Arc::new(ScriptedActions::recording()),
        test_logger(),
    )
    .expect("Plan should validate");

    let report = kickstarter.launch().await;

    assert!(report.error);
    assert_eq!(report.results.len(), 1);
    assert_eq!(
        report.results[0].error_message.as_deref(),
        Some("bad HTTP response code")
    );
}

#[tokio::test]
async fn test_unparseable_body_maps_to_error_envelope() {
    let router = Router::new().route(DISPATCH_PATH, post(|| async { "not json" }));
    let addr = spawn_router(router).await;

    let mut kickstarter = Kickstarter::with_actions(
        all_remote_plan(addr),
        "me",
        Arc::new(ScriptedActions::recording()),
        test_logger(),
    )
    .expect("Plan should validate");

    let report = kickstarter.launch().await;

    assert!(report.error);
    assert_eq!(
        report.results[0].error_message.as_deref(),
        Some("invalid JSON in dispatch response")
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_dispatch_server(Arc::new(ScriptedActions::recording())).await;

    let response = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("Health request failed");
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.expect("Health body not JSON");
    assert_eq!(body["status"], "ok");
}
