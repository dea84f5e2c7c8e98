//! Client error types and result handling.
//!
//! This module defines the error type returned by requests and the
//! [`FutureResult`] wrapper returned by every asynchronous client operation.

use std::future::Future;
use std::future::IntoFuture;
use thiserror::Error;

use crate::client_handler::ReplyError;
use crate::protocol::RpcError;

/// A wrapper around futures that can be polled to get results.
///
/// The operation has already been started when the wrapper is returned:
/// a request is registered and handed to the socket writer before `call`
/// returns, and it is sent even if the wrapper is dropped. Awaiting it
/// yields the outcome; dropping it abandons the outcome and forgets the
/// request.
///
/// # Example
///
/// ```rust,no_run
/// use phr_mcp::client::Client;
/// use phr_mcp::config::Config;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());
///     client.connect().await?;
///
///     // await directly
///     let tools = client.call("tools/list", serde_json::json!({})).await?;
///     println!("{tools}");
///
///     // or start now and await later
///     let pending = client.call("resources/list", serde_json::Value::Null).into_future();
///     let resources = pending.await?;
///     println!("{resources}");
///     Ok(())
/// }
/// ```
pub struct FutureResult<T>(pub(crate) T);

impl<T, R> IntoFuture for FutureResult<T>
where
    T: Future<Output = R>,
{
    type Output = R;
    type IntoFuture = T;

    fn into_future(self) -> Self::IntoFuture {
        self.0
    }
}

/// Errors that can occur when making requests to the server.
#[derive(Error, Debug)]
pub enum CallError {
    /// The client was not connected when the request was made
    #[error("MCP service is not connected")]
    NotConnected,

    /// The server answered with an error object
    #[error(transparent)]
    Server(RpcError),

    /// The connection closed before the response arrived
    #[error("connection closed")]
    ConnectionLost,

    /// No response arrived within the request timeout
    #[error("request timed out")]
    Timeout,

    /// The method name was empty
    #[error("method name must not be empty")]
    InvalidMethod,

    /// The params could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The result did not have the expected shape
    #[error("failed to decode result: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CallError {
    /// Server error object, if the server rejected the request.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            CallError::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ReplyError> for CallError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Closed => CallError::ConnectionLost,
            ReplyError::Server(err) => CallError::Server(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_keeps_code_and_message() {
        let err = CallError::from(ReplyError::Server(RpcError {
            code: -32002,
            message: "Execution failed: boom".into(),
            data: None,
        }));
        assert_eq!(err.rpc_error().map(|e| e.code), Some(-32002));
        assert_eq!(err.to_string(), "MCP Error -32002: Execution failed: boom");
    }

    #[test]
    fn closed_reply_is_connection_lost() {
        assert!(matches!(CallError::from(ReplyError::Closed), CallError::ConnectionLost));
    }
}
