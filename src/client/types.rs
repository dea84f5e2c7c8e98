//! Client types and state management.
//!
//! This module contains the connection status observed by callers and the
//! per-connection handles the client keeps while a socket is open.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::client_handler::PendingMap;

/// Represents the current connection state of the client.
///
/// Legal transitions are `Disconnected -> Connecting -> Connected ->
/// Disconnected` and `Connecting -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Client is not connected to any server
    Disconnected,
    /// Client is attempting to establish a connection
    Connecting,
    /// Client has successfully connected to the server
    Connected,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Disconnected => "disconnected",
            State::Connecting => "connecting",
            State::Connected => "connected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles to an open socket.
///
/// Exists only while the client is `Connected`; dropped on close.
pub(crate) struct Connection {
    /// Frames waiting for the writer task
    pub(crate) writer: mpsc::Sender<Message>,
    /// Requests waiting for a response on this socket
    pub(crate) pending: Arc<PendingMap>,
}

#[cfg(test)]
mod tests {
    use super::State;

    #[test]
    fn state_names() {
        assert_eq!(State::Disconnected.to_string(), "disconnected");
        assert_eq!(State::Connecting.to_string(), "connecting");
        assert_eq!(State::Connected.to_string(), "connected");
    }
}
