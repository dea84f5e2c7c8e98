//! The `initialize` handshake sent after every successful open.
//!
//! The handshake is fire-and-forget: its outcome is logged, it never
//! changes the connection state and no call waits for it.

use crate::protocol::{ClientInfo, InitializeParams, InitializeResult, Method};

use super::Client;

pub(crate) struct HandshakeManager;

impl HandshakeManager {
    pub(crate) fn params(client: &Client) -> InitializeParams {
        let inner = client.0.lock().unwrap();
        InitializeParams {
            client_info: ClientInfo {
                name: inner.name.clone(),
                version: inner.version.clone(),
            },
            protocol_version: inner.protocol_version.clone(),
        }
    }

    /// Sends `initialize` and logs the server's answer in the background.
    pub(crate) fn initialize(client: &Client) {
        let params = Self::params(client);
        let reply = client.request(Method::Initialize(params)).0;
        let rt = client.0.lock().unwrap().rt.clone();

        rt.spawn(async move {
            match reply.await {
                Ok(result) => match serde_json::from_value::<InitializeResult>(result.clone()) {
                    Ok(InitializeResult {
                        server_info: Some(server),
                        protocol_version,
                        ..
                    }) => {
                        log::info!(
                            "MCP server initialized: {} {} (protocol {})",
                            server.name,
                            server.version,
                            protocol_version.as_deref().unwrap_or("unknown")
                        );
                    }
                    _ => log::info!("MCP server initialized: {}", result),
                },
                Err(err) => log::error!("MCP initialization failed: {}", err),
            }
        });
    }
}
