//! Internal client implementation and connection lifecycle management.
//!
//! This module contains the state shared by every [`Client`](super::Client)
//! clone, the status transitions and the task driving one connection from
//! opening the socket to its close.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::client::types::{Connection, State};
use crate::client_handler::{PendingMap, websocket_handler};
use crate::config::ReconnectStrategy;
use crate::errors::ConnectError;
use crate::subscription::Registry;

use super::Client;
use super::connection::ConnectionManager;
use super::handshake::HandshakeManager;

/// Internal client implementation that manages the connection lifecycle.
pub(crate) struct ClientInner {
    /// Tokio runtime handle for spawning tasks
    pub(crate) rt: Handle,
    /// WebSocket server URL
    pub(crate) url: Arc<str>,
    /// Current connection state
    pub(crate) state: State,
    /// Client name sent in `initialize`
    pub(crate) name: String,
    /// Client version sent in `initialize`
    pub(crate) version: String,
    /// Protocol revision sent in `initialize`
    pub(crate) protocol_version: String,
    /// Timeout applied to every `call`
    pub(crate) call_timeout: Option<Duration>,
    /// Capacity of the outbound frame queue
    pub(crate) outbound_capacity: usize,
    /// Delay policy for the reconnection supervisor
    pub(crate) reconnect_strategy: Arc<dyn ReconnectStrategy>,
    /// Attempt budget for the reconnection supervisor
    pub(crate) max_reconnect_attempts: Option<u32>,
    /// Identifies the current connection attempt
    pub(crate) epoch: u64,
    /// Next request id; never reset, so ids are unique for the client lifetime
    pub(crate) next_id: u64,
    /// Whether the last explicit request was `connect` rather than `disconnect`
    pub(crate) wants_connection: bool,
    /// Channel for interrupting the current attempt or socket
    pub(crate) closer_write: Option<mpsc::Sender<()>>,
    /// Open socket handles, present only while connected
    pub(crate) connection: Option<Connection>,
    /// Channels waiting for the current connection attempt to finish
    pub(crate) on_connected_ch: Vec<oneshot::Sender<Result<(), ConnectError>>>,
    /// Notification, status and error callbacks
    pub(crate) registry: Arc<Mutex<Registry>>,
    /// Status transitions not yet delivered to listeners
    pub(crate) status_queue: VecDeque<State>,
    /// Whether some thread is currently delivering `status_queue`
    pub(crate) delivering_status: bool,
}

impl ClientInner {
    /// Transitions the client to the connecting state and spawns the
    /// connection task.
    pub(crate) fn move_to_connecting(&mut self, outer: Arc<Mutex<Self>>) {
        debug_assert_eq!(self.state, State::Disconnected);
        self.epoch += 1;
        self.wants_connection = true;
        let (closer_write, closer_read) = mpsc::channel::<()>(1);
        self.closer_write = Some(closer_write.clone());
        self._set_state(State::Connecting);

        let epoch = self.epoch;
        self.rt.spawn(Self::do_connection_cycle(
            outer,
            epoch,
            closer_write,
            closer_read,
        ));
    }

    /// Transitions the client to the connected state.
    pub(crate) fn move_to_connected(&mut self, connection: Connection) {
        assert_eq!(self.state, State::Connecting);
        self.connection = Some(connection);
        self._set_state(State::Connected);
        for ch in self.on_connected_ch.drain(..) {
            let _ = ch.send(Ok(()));
        }
    }

    /// Transitions the client to the disconnected state.
    ///
    /// Rejects every pending request and stops the socket, if any.
    pub(crate) fn move_to_disconnected(&mut self, reason: ConnectError) {
        assert_ne!(self.state, State::Disconnected);
        if let Some(closer_write) = self.closer_write.take() {
            let _ = closer_write.try_send(());
        }
        if let Some(connection) = self.connection.take() {
            connection.pending.close();
        }
        self._set_state(State::Disconnected);
        for ch in self.on_connected_ch.drain(..) {
            let _ = ch.send(Err(reason.clone()));
        }
    }

    pub(crate) fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Drives one connection attempt: open, handshake, serve, close.
    async fn do_connection_cycle(
        client: Arc<Mutex<Self>>,
        epoch: u64,
        closer_write: mpsc::Sender<()>,
        mut closer_read: mpsc::Receiver<()>,
    ) {
        let stream = ConnectionManager::do_connect(&client, &mut closer_read).await;

        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                {
                    let mut inner = client.lock().unwrap();
                    if inner.epoch == epoch && inner.state == State::Connecting {
                        inner.move_to_disconnected(err);
                    }
                }
                Self::deliver_status(&client);
                return;
            }
        };

        let (writer, outbound) = {
            let inner = client.lock().unwrap();
            mpsc::channel(inner.outbound_capacity)
        };
        let pending = Arc::new(PendingMap::new());

        let (rt, registry) = {
            let mut inner = client.lock().unwrap();
            if inner.epoch != epoch || inner.state != State::Connecting {
                log::debug!("connection attempt superseded, dropping socket");
                return;
            }
            inner.move_to_connected(Connection {
                writer,
                pending: pending.clone(),
            });
            (inner.rt.clone(), inner.registry.clone())
        };
        Self::deliver_status(&client);

        HandshakeManager::initialize(&Client(client.clone()));

        let notify_registry = registry.clone();
        let error_registry = registry;
        let closed_client = client.clone();
        websocket_handler(
            rt,
            stream,
            outbound,
            closer_write,
            closer_read,
            pending,
            move |method, params| Registry::emit_event(&notify_registry, &method, params),
            move |err| Registry::emit_error(&error_registry, err),
            move || {
                {
                    let mut inner = closed_client.lock().unwrap();
                    if inner.epoch == epoch && inner.state == State::Connected {
                        log::debug!("MCP WebSocket connection closed");
                        inner.move_to_disconnected(ConnectError::Interrupted);
                    }
                }
                Self::deliver_status(&closed_client);
            },
        )
        .await;
    }

    /// Delivers queued status transitions to the status listeners.
    ///
    /// Must be called without holding the client lock. Listeners run
    /// unlocked; transitions they trigger are queued and delivered by the
    /// outermost caller, so listeners always observe transitions in order.
    pub(crate) fn deliver_status(client: &Arc<Mutex<Self>>) {
        let registry = {
            let mut inner = client.lock().unwrap();
            if inner.delivering_status || inner.status_queue.is_empty() {
                return;
            }
            inner.delivering_status = true;
            inner.registry.clone()
        };

        loop {
            let state = {
                let mut inner = client.lock().unwrap();
                match inner.status_queue.pop_front() {
                    Some(state) => state,
                    None => {
                        inner.delivering_status = false;
                        break;
                    }
                }
            };
            Registry::emit_status(&registry, state);
        }
    }

    /// Updates the client state and queues the transition for listeners.
    fn _set_state(&mut self, state: State) {
        log::debug!("state: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.status_queue.push_back(state);
    }
}
