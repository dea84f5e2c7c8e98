use std::time::Duration;

use phr_mcp::client::{CallError, Client, State};
use phr_mcp::config::{self, Config};
use phr_mcp::protocol::ToolCall;
use serde_json::json;

#[tokio::test]
async fn test_client_creation() {
    let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());

    assert_eq!(client.state(), State::Disconnected);
    assert!(!client.wants_connection());
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_call_before_connect_fails() {
    let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());

    let result = client.call("tools/list", json!({})).await;
    assert!(matches!(result, Err(CallError::NotConnected)));

    let result = client
        .call_tool(ToolCall::GetHistory {})
        .await;
    assert!(matches!(result, Err(CallError::NotConnected)));

    let result = client.notify("notifications/initialized", json!({})).await;
    assert!(matches!(result, Err(CallError::NotConnected)));
}

#[tokio::test]
async fn test_empty_method_is_rejected() {
    let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());

    let result = client.call("", json!({})).await;
    assert!(matches!(result, Err(CallError::InvalidMethod)));
}

#[tokio::test]
async fn test_config_methods() {
    let config = Config::new()
        .with_name("asset-report")
        .with_version("2.0.0")
        .with_protocol_version("2025-03-26")
        .with_call_timeout(Duration::from_secs(30))
        .with_outbound_capacity(0)
        .with_max_reconnect_attempts(None);

    assert_eq!(config.name, "asset-report");
    assert_eq!(config.version, "2.0.0");
    assert_eq!(config.protocol_version, "2025-03-26");
    assert_eq!(config.call_timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.outbound_capacity, 1);
    assert_eq!(config.max_reconnect_attempts, None);
}

#[test]
fn test_default_endpoint() {
    assert_eq!(
        config::mcp_endpoint(config::DEFAULT_API_URL),
        "ws://127.0.0.1:8000/mcp"
    );
}

#[tokio::test]
async fn test_listener_registration() {
    let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());

    let first = client.on("analysis/progress", |_| {});
    let second = client.on_analysis_progress(|_| {});
    let status = client.on_status_change(|_| {});
    assert_eq!(client.listener_count("analysis/progress"), 2);
    assert_eq!(first.method(), Some("analysis/progress"));
    assert_eq!(status.method(), None);

    assert!(first.unsubscribe());
    assert!(!first.unsubscribe());
    assert_eq!(client.listener_count("analysis/progress"), 1);

    client.dispose();
    assert_eq!(client.listener_count("analysis/progress"), 0);
    assert!(!second.unsubscribe());
    assert!(!status.unsubscribe());
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.on_status_change(move |state| {
        let _ = tx.send(state);
    });

    client.disconnect();
    client.dispose();

    assert_eq!(client.state(), State::Disconnected);
    assert!(rx.try_recv().is_err());
}
