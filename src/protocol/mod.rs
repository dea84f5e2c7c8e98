//! # Protocol Module
//!
//! JSON-RPC 2.0 envelopes exchanged with the PHR Analytics MCP server.
//!
//! ## Protocol Overview
//!
//! Every WebSocket message carries exactly one JSON object:
//! - **Request** (client → server): `{"jsonrpc":"2.0","method":..,"params":..,"id":..}`
//! - **Notification** (client → server): same shape without `id`
//! - **Response** (server → client): `{"id":..,"result":..}` or `{"id":..,"error":{..}}`
//! - **Notification** (server → client): `{"method":..,"params":..}`; a frame
//!   with both `id` and `method` answers a pending request with that id and
//!   is a notification otherwise
//!
//! ## Core Types
//!
//! - **OutboundFrame**: what the client writes to the socket
//! - **RawFrame**: what the server writes, before classification
//! - **Frame**: a classified inbound frame
//! - **Method**: typed well-known methods, with an open `Custom` fallback
//!
//! ## Example
//!
//! ```rust
//! use phr_mcp::protocol::{Frame, RawFrame};
//!
//! let raw: RawFrame = serde_json::from_str(r#"{"id":7,"result":{"ok":true}}"#).unwrap();
//! match Frame::from(raw) {
//!     Frame::Response { id, outcome } => {
//!         assert_eq!(id, 7);
//!         assert!(outcome.is_ok());
//!     }
//!     other => panic!("unexpected frame: {:?}", other),
//! }
//! ```

pub mod tools;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use tools::{AnalysisProgress, ProgressStatus, ToolCall, ToolResult};

/// Value of the `jsonrpc` member of every outbound frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Notification method the server uses to report analysis progress.
pub const ANALYSIS_PROGRESS: &str = "analysis/progress";

/// Error codes produced by the MCP server.
pub mod error_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const RESOURCE_NOT_FOUND: i64 = -32001;
    pub const TOOL_EXECUTION_FAILED: i64 = -32002;
    pub const DATABASE_CONNECTION_FAILED: i64 = -32005;
}

/// Error object carried by a failed response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("MCP Error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Frame written by the client. Without an `id` it is a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl OutboundFrame {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: normalize_params(params),
            id: Some(id),
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: normalize_params(params),
            id: None,
        }
    }
}

// the server reads params with `.get(..)`, so null must go out as an empty object
fn normalize_params(params: Value) -> Value {
    match params {
        Value::Null => Value::Object(Map::new()),
        params => params,
    }
}

/// Inbound frame as found on the wire.
///
/// All members are optional; [`Frame::from`] decides what the frame is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Reply to a request previously sent with `id`
    Response {
        id: u64,
        outcome: Result<Value, RpcError>,
    },
    /// Server-pushed event; `params` is `null` when absent
    Notification { method: String, params: Value },
    /// Carries both an id and a method: a reply when `id` is pending,
    /// otherwise a notification
    Either {
        id: u64,
        outcome: Result<Value, RpcError>,
        method: String,
        params: Value,
    },
    /// Neither a response nor a notification
    Unrecognized(RawFrame),
}

impl From<RawFrame> for Frame {
    fn from(raw: RawFrame) -> Self {
        let RawFrame {
            id,
            method,
            params,
            result,
            error,
        } = raw;
        let outcome = |result: Option<Value>, error: Option<RpcError>| match error {
            Some(err) => Err(err),
            None => Ok(result.unwrap_or(Value::Null)),
        };

        match (id.as_ref().and_then(Value::as_u64), method) {
            (Some(id), None) => Frame::Response {
                id,
                outcome: outcome(result, error),
            },
            (Some(id), Some(method)) => Frame::Either {
                id,
                outcome: outcome(result, error),
                method,
                params: params.unwrap_or(Value::Null),
            },
            (None, Some(method)) => Frame::Notification {
                method,
                params: params.unwrap_or(Value::Null),
            },
            (None, None) => Frame::Unrecognized(RawFrame {
                id,
                method: None,
                params,
                result,
                error,
            }),
        }
    }
}

/// Identification sent with `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub client_info: ClientInfo,
    pub protocol_version: String,
}

/// Result of `initialize`. Only logged by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Option<ClientInfo>,
}

/// Well-known JSON-RPC methods of the MCP server.
///
/// `Custom` covers anything else, so new server methods can be used
/// before they get a typed variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Initialize(InitializeParams),
    Initialized,
    ToolsList,
    ToolsCall(ToolCall),
    ResourcesList,
    ResourcesRead { uri: String },
    PromptsList,
    PromptsGet {
        name: String,
        arguments: Map<String, Value>,
    },
    Custom { method: String, params: Value },
}

impl Method {
    pub fn name(&self) -> &str {
        match self {
            Method::Initialize(_) => "initialize",
            Method::Initialized => "notifications/initialized",
            Method::ToolsList => "tools/list",
            Method::ToolsCall(_) => "tools/call",
            Method::ResourcesList => "resources/list",
            Method::ResourcesRead { .. } => "resources/read",
            Method::PromptsList => "prompts/list",
            Method::PromptsGet { .. } => "prompts/get",
            Method::Custom { method, .. } => method,
        }
    }

    pub fn params(&self) -> Result<Value, serde_json::Error> {
        Ok(match self {
            Method::Initialize(params) => serde_json::to_value(params)?,
            Method::ToolsCall(call) => serde_json::to_value(call)?,
            Method::ResourcesRead { uri } => serde_json::json!({ "uri": uri }),
            Method::PromptsGet { name, arguments } => {
                serde_json::json!({ "name": name, "arguments": arguments })
            }
            Method::Custom { params, .. } => params.clone(),
            Method::Initialized
            | Method::ToolsList
            | Method::ResourcesList
            | Method::PromptsList => Value::Object(Map::new()),
        })
    }
}

impl From<ToolCall> for Method {
    fn from(call: ToolCall) -> Self {
        Method::ToolsCall(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(text: &str) -> Frame {
        Frame::from(serde_json::from_str::<RawFrame>(text).unwrap())
    }

    #[test]
    fn request_envelope_shape() {
        let frame = OutboundFrame::request(3, "tools/list", Value::Null);
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"jsonrpc": "2.0", "method": "tools/list", "params": {}, "id": 3})
        );
    }

    #[test]
    fn notification_envelope_has_no_id() {
        let frame = OutboundFrame::notification("notifications/initialized", json!({}));
        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn response_with_result() {
        assert_eq!(
            classify(r#"{"jsonrpc":"2.0","id":1,"result":[1,2]}"#),
            Frame::Response { id: 1, outcome: Ok(json!([1, 2])) }
        );
    }

    #[test]
    fn response_without_result_is_null() {
        assert_eq!(
            classify(r#"{"id":4}"#),
            Frame::Response { id: 4, outcome: Ok(Value::Null) }
        );
    }

    #[test]
    fn response_with_error() {
        let frame = classify(r#"{"id":2,"error":{"code":-32601,"message":"Method 'x' not found"}}"#);
        let Frame::Response { id, outcome: Err(err) } = frame else {
            panic!("expected error response");
        };
        assert_eq!(id, 2);
        assert_eq!(err.code, error_code::METHOD_NOT_FOUND);
        assert_eq!(err.to_string(), "MCP Error -32601: Method 'x' not found");
    }

    #[test]
    fn notification_keeps_params() {
        assert_eq!(
            classify(r#"{"jsonrpc":"2.0","method":"analysis/progress","params":{"status":"starting"}}"#),
            Frame::Notification {
                method: ANALYSIS_PROGRESS.into(),
                params: json!({"status": "starting"}),
            }
        );
    }

    #[test]
    fn id_and_method_keeps_both_readings() {
        assert_eq!(
            classify(r#"{"id":1,"method":"x","result":5}"#),
            Frame::Either {
                id: 1,
                outcome: Ok(json!(5)),
                method: "x".into(),
                params: Value::Null,
            }
        );
    }

    #[test]
    fn null_id_without_method_is_unrecognized() {
        assert!(matches!(classify(r#"{"id":null,"result":{}}"#), Frame::Unrecognized(_)));
        assert!(matches!(classify(r#"{}"#), Frame::Unrecognized(_)));
    }

    #[test]
    fn method_params_for_resources_read() {
        let method = Method::ResourcesRead { uri: "phr://resource/a.csv".into() };
        assert_eq!(method.name(), "resources/read");
        assert_eq!(method.params().unwrap(), json!({"uri": "phr://resource/a.csv"}));
    }
}
