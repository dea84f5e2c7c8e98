//! Client SDK for the PHR Analytics MCP server.
//!
//! The server speaks JSON-RPC 2.0 over a WebSocket. [`client::Client`]
//! correlates responses with requests, dispatches server notifications such
//! as `analysis/progress` to subscribers and reports connection status.
//! [`reconnect::Reconnector`] adds automatic reconnection on top of it.

pub mod client;
mod client_handler;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod reconnect;
pub mod subscription;
mod utils;

// Frames on the outbound queue are tungstenite messages, re-export it so
// users get the same version.
pub use tokio_tungstenite::tungstenite;
