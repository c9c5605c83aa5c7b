use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::commands;
use crate::config::StateStore;
use crate::infrastructure::rpc::RpcMetrics;
use crate::infrastructure::RpcClient;
use crate::services::for_platform;
use crate::ui;

/// Health, slot and TPS as shown in the status table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsView {
    pub health: String,
    pub slot: String,
    pub tps: String,
}

impl MetricsView {
    fn from_result(result: Result<RpcMetrics, String>) -> Self {
        match result {
            Ok(metrics) => Self {
                health: "ok".to_string(),
                slot: metrics.slot.to_string(),
                tps: format!("{:.2}", metrics.tps),
            },
            Err(health) => Self {
                health,
                slot: "n/a".to_string(),
                tps: "n/a".to_string(),
            },
        }
    }
}

/// Fetch metrics, mapping failures to the health column text
pub async fn fetch_metrics(rpc_url: &str, timeout: Duration) -> MetricsView {
    let client = RpcClient::with_timeout(rpc_url, timeout);
    let result = match tokio::time::timeout(timeout, client.fetch_metrics()).await {
        Ok(Ok(metrics)) => Ok(metrics),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("timeout".to_string()),
    };
    MetricsView::from_result(result)
}

fn status_label(state: &str) -> String {
    if state.eq_ignore_ascii_case("running") {
        "Running ✓".to_string()
    } else {
        state.to_string()
    }
}

pub async fn execute(name: Option<String>, timeout: Duration, config: Option<&Path>) -> Result<()> {
    let project_dir = commands::project_dir()?;
    let project = commands::load_project(config, &project_dir)?;
    let state = StateStore::for_project(&project_dir)
        .load()
        .context("Failed to load local deployment state")?;
    let record = commands::resolve_record(&state, name.as_deref(), project.platform()?, &project_dir)?;

    let spinner = ui::spinner(format!("Checking {}...", record.name));
    let provider = for_platform(record.provider, commands::provider_options(&project_dir)?);
    let (provider_status, metrics) = tokio::join!(
        provider.status(&record.name),
        fetch_metrics(&record.rpc_url, timeout)
    );
    spinner.finish_and_clear();

    let (state_text, provider_warning) = match provider_status {
        Ok(status) => (status.state, None),
        Err(e) => ("unknown".to_string(), Some(e.to_string())),
    };

    ui::print_field("Validator", &record.name);
    ui::print_field("Provider", record.provider);
    ui::print_field("Status", status_label(&state_text));
    ui::print_field("Health", &metrics.health);
    ui::print_field("Slot", &metrics.slot);
    ui::print_field("TPS", &metrics.tps);
    ui::print_field("RPC", &record.rpc_url);
    ui::print_field("WebSocket", &record.websocket_url);
    if let Some(url) = &record.dashboard_url {
        ui::print_field("Dashboard", url);
    }
    if let Some(warning) = provider_warning {
        ui::print_warning(&format!("Provider check warning: {warning}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn rpc(samples: Value) -> Router {
        Router::new().route(
            "/",
            post(move |Json(request): Json<Value>| {
                let samples = samples.clone();
                async move {
                    let result = match request["method"].as_str().unwrap_or_default() {
                        "getHealth" => json!("ok"),
                        "getSlot" => json!(4242),
                        _ => samples,
                    };
                    Json(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_metrics_from_healthy_validator() {
        let url = serve(rpc(json!([{
            "slot": 4242, "numTransactions": 300, "numSlots": 150, "samplePeriodSecs": 60
        }])))
        .await;

        let view = fetch_metrics(&url, Duration::from_secs(5)).await;
        assert_eq!(
            view,
            MetricsView {
                health: "ok".to_string(),
                slot: "4242".to_string(),
                tps: "5.00".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_samples_is_reported_in_health() {
        let url = serve(rpc(json!([]))).await;

        let view = fetch_metrics(&url, Duration::from_secs(5)).await;
        assert_ne!(view.health, "ok");
        assert_eq!(view.slot, "n/a");
        assert_eq!(view.tps, "n/a");
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label("running"), "Running ✓");
        assert_eq!(status_label("stopped"), "stopped");
    }
}
