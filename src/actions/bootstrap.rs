//! One-shot creation of the system collections through a coordinator.

use serde_json::Value;
use slog::{info, warn, Logger};
use std::time::Duration;

use crate::plan::{CreateSystemCollsData, RunDetail, RunInfo};

const VERSION_POLL_TICK: Duration = Duration::from_secs(1);
const BOOTSTRAP_GRACE: Duration = Duration::from_secs(5);
const EXECUTE_TIMEOUT: Duration = Duration::from_secs(90);

/// Script executed on the coordinator once it answers.
const BOOTSTRAP_SCRIPT: &str = "cluster.bootstrapSystemCollections();";

pub async fn launch(logger: &Logger, http: &reqwest::Client, data: &CreateSystemCollsData) -> RunInfo {
    let username = data.username.as_deref().unwrap_or("root");
    let passwd = data.passwd.as_deref().unwrap_or("");

    let version_url = format!("{}/_api/version", data.url);
    info!(logger, "waiting for coordinator"; "url" => &version_url);

    // No attempt cap: the coordinator may still be replaying its plan.
    loop {
        match http
            .get(&version_url)
            .basic_auth(username, Some(passwd))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => break,
            _ => tokio::time::sleep(VERSION_POLL_TICK).await,
        }
    }

    tokio::time::sleep(BOOTSTRAP_GRACE).await;

    let execute_url = format!("{}/_admin/execute?returnAsJSON=true", data.url);
    info!(logger, "creating system collections"; "url" => &execute_url);

    let response = match http
        .post(&execute_url)
        .basic_auth(username, Some(passwd))
        .timeout(EXECUTE_TIMEOUT)
        .body(BOOTSTRAP_SCRIPT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return RunInfo::failed(format!("bootstrap execute failed: {}", e)),
    };

    let status = response.status();
    if !status.is_success() {
        return RunInfo::failed(format!("bootstrap execute returned HTTP {}", status.as_u16()));
    }

    match response.json::<Value>().await {
        Ok(body) => {
            let error = body.get("error").and_then(Value::as_bool).unwrap_or(false);
            if error {
                warn!(logger, "bootstrap script reported an error"; "url" => &execute_url);
            }
            RunInfo {
                error,
                error_message: error.then(|| "bootstrap script reported an error".to_string()),
                detail: RunDetail::Bootstrap { response: body },
            }
        }
        Err(e) => RunInfo::failed(format!("invalid JSON from bootstrap execute: {}", e)),
    }
}
