//! Socket establishment.
//!
//! This module opens the WebSocket for a connection attempt and lets a
//! `disconnect` interrupt it while the handshake with the server is still
//! in flight.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::errors::ConnectError;
use crate::subscription::Registry;

use super::inner::ClientInner;

pub(crate) struct ConnectionManager;

impl ConnectionManager {
    /// Establishes a WebSocket connection to the server.
    ///
    /// Open failures are forwarded to the error callback and returned;
    /// they are never retried here.
    pub(crate) fn do_connect<'a>(
        client: &Arc<Mutex<ClientInner>>,
        closer_read: &'a mut mpsc::Receiver<()>,
    ) -> impl Future<Output = Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ConnectError>> + 'a
    {
        let (url, registry) = {
            let inner = client.lock().unwrap();
            (inner.url.clone(), inner.registry.clone())
        };

        async move {
            let task = async {
                log::debug!("connecting to MCP server at {}", &url);
                match tokio_tungstenite::connect_async(&*url).await {
                    Ok((stream, _)) => {
                        log::debug!("MCP WebSocket connection established");
                        Ok(stream)
                    }
                    Err(err) => {
                        log::debug!("MCP WebSocket error: {err}");
                        let err = ConnectError::from(err);
                        Registry::emit_error(&registry, anyhow::Error::new(err.clone()));
                        Err(err)
                    }
                }
            };

            tokio::select! {
                biased;
                _ = closer_read.recv() => {
                    log::debug!("connection attempt interrupted by user");
                    Err(ConnectError::Interrupted)
                }
                result = task => result
            }
        }
    }
}
