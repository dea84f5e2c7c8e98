use std::time::Duration;

use phr_mcp::client::Client;
use phr_mcp::config::{self, Config};
use phr_mcp::protocol::tools::AnalysisOptions;
use phr_mcp::protocol::{Method, ToolCall};
use phr_mcp::reconnect::Reconnector;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            Targets::new()
                .with_default(LevelFilter::INFO)
                .with_target("phr_mcp", LevelFilter::TRACE),
        )
        .init();

    let client = Client::new(
        &config::endpoint_from_env(),
        Config::new().with_call_timeout(Duration::from_secs(30)),
    );
    let _reconnector = Reconnector::spawn(&client);

    client.on_status_change(|state| {
        log::info!("MCP status: {}", state);
    });
    client.on_error(|err| {
        log::info!("error: {:?}", err);
    });
    client.on_analysis_progress(|progress| {
        log::info!("analysis {:?}: {}", progress.status, progress.message);
    });

    if let Err(err) = client.connect().await {
        log::error!("failed to connect: {}", err);
        return;
    }

    match client.request(Method::ToolsList).await {
        Ok(tools) => log::info!("tools: {}", tools),
        Err(err) => log::error!("tools/list failed: {}", err),
    }

    match client
        .call_tool(ToolCall::GetDashboardData {
            area: Some("Semua Area".into()),
        })
        .await
    {
        Ok(result) => log::info!("dashboard: {}", result.content),
        Err(err) => log::error!("get_dashboard_data failed: {}", err),
    }

    // results arrive as analysis/progress notifications
    drop(client.call_tool(ToolCall::TriggerAnalysis(AnalysisOptions::default())));

    tokio::signal::ctrl_c().await.ok();
    client.dispose();
}
