//! Client implementation for the PHR Analytics MCP server.
//!
//! This module provides the JSON-RPC client used by every dashboard page:
//! it opens the WebSocket, correlates responses to requests by id, fans out
//! server notifications to subscribers and reports connection status.
//!
//! # Example
//!
//! ```rust,no_run
//! use phr_mcp::client::{Client, State};
//! use phr_mcp::config::{self, Config};
//! use phr_mcp::protocol::ToolCall;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = Client::new(&config::endpoint_from_env(), Config::new());
//!
//!     client.on_status_change(|state| println!("MCP status: {state}"));
//!     client.on_analysis_progress(|progress| println!("{:?}: {}", progress.status, progress.message));
//!
//!     client.connect().await?;
//!     assert_eq!(client.state(), State::Connected);
//!
//!     let dashboard = client
//!         .call_tool(ToolCall::GetDashboardData { area: Some("Semua Area".into()) })
//!         .await?;
//!     println!("{}", dashboard.content);
//!
//!     client.dispose();
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod errors;
pub mod handshake;
pub mod inner;
pub mod types;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::client_handler::{PendingMap, ReplyError};
use crate::config::{Config, ReconnectStrategy};
use crate::errors::ConnectError;
use crate::protocol::{ANALYSIS_PROGRESS, AnalysisProgress, Method, OutboundFrame, ToolCall, ToolResult};
use crate::subscription::{Registry, Subscription};
use crate::utils::encode_frame;

pub use errors::{CallError, FutureResult};
use inner::ClientInner;
pub use types::State;

/// A request registered on the socket and handed to the writer.
struct Prepared {
    reply: oneshot::Receiver<Result<Value, ReplyError>>,
    entry: PendingEntry,
}

/// Removes a request from its pending map once nobody waits for it.
struct PendingEntry {
    id: u64,
    pending: Arc<PendingMap>,
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if self.pending.remove(self.id) {
            log::trace!("abandoned request id={}", self.id);
        }
    }
}

/// JSON-RPC client for the MCP server.
///
/// Construct one per application with [`Client::new`], pass clones to
/// whoever needs it and call [`Client::dispose`] on shutdown.
///
/// # Thread Safety
///
/// The client is safe to use from multiple threads and can be cloned;
/// clones share the same connection and subscribers.
#[derive(Clone)]
pub struct Client(pub(crate) Arc<Mutex<ClientInner>>);

impl Client {
    /// Creates a new client instance. No connection is opened yet.
    ///
    /// Must be called inside a tokio runtime unless
    /// [`Config::with_runtime`] was used.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use phr_mcp::client::{Client, State};
    /// use phr_mcp::config::Config;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());
    /// assert_eq!(client.state(), State::Disconnected);
    /// # }
    /// ```
    pub fn new(url: &str, config: Config) -> Self {
        let rt = config.runtime.unwrap_or_else(Handle::current);

        Self(Arc::new(Mutex::new(ClientInner {
            rt,
            url: url.into(),
            state: State::Disconnected,
            name: config.name,
            version: config.version,
            protocol_version: config.protocol_version,
            call_timeout: config.call_timeout,
            outbound_capacity: config.outbound_capacity.max(1),
            reconnect_strategy: config.reconnect_strategy,
            max_reconnect_attempts: config.max_reconnect_attempts,
            epoch: 0,
            next_id: 1,
            wants_connection: false,
            closer_write: None,
            connection: None,
            on_connected_ch: Vec::new(),
            registry: Arc::new(Mutex::new(Registry::default())),
            status_queue: VecDeque::new(),
            delivering_status: false,
        })))
    }

    /// Opens the connection.
    ///
    /// Does nothing if the client is already connecting or connected.
    /// Otherwise the status moves to `Connecting` before this returns and the
    /// socket is opened in the background; once open, the status becomes
    /// `Connected` and an `initialize` request is sent.
    ///
    /// The returned future resolves when the attempt finishes. It may be
    /// dropped: completion is also reported through
    /// [`Client::on_status_change`].
    pub fn connect(
        &self,
    ) -> FutureResult<impl Future<Output = Result<(), ConnectError>> + use<>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.0.lock().unwrap();
            match inner.state {
                State::Connected => {
                    log::warn!("MCP service already connected or connecting.");
                    let _ = tx.send(Ok(()));
                }
                State::Connecting => {
                    log::warn!("MCP service already connected or connecting.");
                    inner.on_connected_ch.push(tx);
                }
                State::Disconnected => {
                    inner.on_connected_ch.push(tx);
                    inner.move_to_connecting(self.0.clone());
                }
            }
        }
        ClientInner::deliver_status(&self.0);

        FutureResult(async move { rx.await.unwrap_or(Err(ConnectError::Interrupted)) })
    }

    /// Closes the connection.
    ///
    /// Every pending request is rejected with [`CallError::ConnectionLost`].
    /// Subscribers are kept; [`Client::connect`] may be called again.
    pub fn disconnect(&self) {
        {
            let mut inner = self.0.lock().unwrap();
            inner.wants_connection = false;
            if inner.state == State::Disconnected {
                return;
            }
            inner.epoch += 1;
            inner.move_to_disconnected(ConnectError::Interrupted);
        }
        ClientInner::deliver_status(&self.0);
    }

    /// Closes the connection and drops every subscriber.
    pub fn dispose(&self) {
        self.disconnect();
        let registry = self.0.lock().unwrap().registry.clone();
        registry.lock().unwrap().clear();
    }

    /// Makes an RPC call to the server.
    ///
    /// Fails right away with [`CallError::NotConnected`] unless the client
    /// is connected. The request is handed to the socket writer before this
    /// returns and goes out even if the returned future is dropped; dropping
    /// it only abandons the result. The configured [`Config::call_timeout`]
    /// applies.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use phr_mcp::client::Client;
    /// use phr_mcp::config::Config;
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    /// let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());
    /// client.connect().await?;
    /// let users = client
    ///     .call("tools/call", json!({"name": "get_all_users", "arguments": {}}))
    ///     .await?;
    /// println!("{}", users["content"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn call(
        &self,
        method: &str,
        params: Value,
    ) -> FutureResult<impl Future<Output = Result<Value, CallError>> + use<>> {
        let timeout = self.0.lock().unwrap().call_timeout;
        self.send_request(method, Ok(params), timeout)
    }

    /// Same as [`Client::call`], but rejects with [`CallError::Timeout`] if
    /// no response arrives within `timeout`. A response arriving later is
    /// ignored.
    pub fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> FutureResult<impl Future<Output = Result<Value, CallError>> + use<>> {
        self.send_request(method, Ok(params), Some(timeout))
    }

    /// Makes a typed RPC call.
    pub fn request(
        &self,
        method: Method,
    ) -> FutureResult<impl Future<Output = Result<Value, CallError>> + use<>> {
        let timeout = self.0.lock().unwrap().call_timeout;
        let params = method.params().map_err(CallError::Encode);
        self.send_request(method.name(), params, timeout)
    }

    /// Invokes a server tool through `tools/call`.
    ///
    /// [`ToolCall::TriggerAnalysis`] never gets a response; follow it with
    /// [`Client::on_analysis_progress`] and drop the returned future, or
    /// configure a call timeout.
    pub fn call_tool(
        &self,
        call: ToolCall,
    ) -> FutureResult<impl Future<Output = Result<ToolResult, CallError>> + use<>> {
        let reply = self.request(Method::ToolsCall(call)).0;
        FutureResult(async move {
            let result = reply.await?;
            serde_json::from_value(result).map_err(CallError::Decode)
        })
    }

    /// Sends a notification: a request without id that gets no response.
    pub fn notify(
        &self,
        method: &str,
        params: Value,
    ) -> FutureResult<impl Future<Output = Result<(), CallError>> + use<>> {
        let sent = self.prepare_notification(method, params);
        FutureResult(async move { sent })
    }

    /// Registers `func` for server notifications named `method`.
    ///
    /// `func` receives the notification's `params` (`null` when absent).
    /// Callbacks for the same method run in registration order. The
    /// subscription outlives reconnects until it is unsubscribed.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use phr_mcp::client::Client;
    /// use phr_mcp::config::Config;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());
    /// let subscription = client.on("analysis/progress", |params| {
    ///     println!("progress: {}", params["message"]);
    /// });
    /// // later
    /// subscription.unsubscribe();
    /// # }
    /// ```
    pub fn on(&self, method: &str, func: impl FnMut(Value) + Send + 'static) -> Subscription {
        let registry = self.registry();
        let id = registry.lock().unwrap().add_event(method, func);
        Subscription::event(&registry, method, id)
    }

    /// Typed variant of [`Client::on`] for `analysis/progress`.
    ///
    /// Notifications whose params do not decode are logged and skipped.
    pub fn on_analysis_progress(
        &self,
        mut func: impl FnMut(AnalysisProgress) + Send + 'static,
    ) -> Subscription {
        self.on(ANALYSIS_PROGRESS, move |params| {
            match serde_json::from_value::<AnalysisProgress>(params) {
                Ok(progress) => func(progress),
                Err(err) => log::debug!("malformed {} params: {}", ANALYSIS_PROGRESS, err),
            }
        })
    }

    /// Registers `func` to be called with the new status on every transition.
    pub fn on_status_change(&self, func: impl FnMut(State) + Send + 'static) -> Subscription {
        let registry = self.registry();
        let id = registry.lock().unwrap().add_status(func);
        Subscription::status(&registry, id)
    }

    /// Sets a callback for transport errors and malformed frames.
    ///
    /// Replaces any previous error callback.
    pub fn on_error(&self, func: impl FnMut(anyhow::Error) + Send + 'static) {
        self.registry().lock().unwrap().set_error(func);
    }

    /// Returns the current connection state.
    pub fn state(&self) -> State {
        self.0.lock().unwrap().state
    }

    /// Number of requests waiting for a response on the current socket.
    pub fn pending_requests(&self) -> usize {
        let inner = self.0.lock().unwrap();
        inner
            .connection
            .as_ref()
            .map_or(0, |connection| connection.pending.len())
    }

    /// Number of callbacks registered for notifications named `method`.
    pub fn listener_count(&self, method: &str) -> usize {
        self.registry().lock().unwrap().event_listener_count(method)
    }

    /// Whether [`Client::connect`] was called more recently than
    /// [`Client::disconnect`].
    pub fn wants_connection(&self) -> bool {
        self.0.lock().unwrap().wants_connection
    }

    pub(crate) fn reconnect_policy(&self) -> (Arc<dyn ReconnectStrategy>, Option<u32>, Handle) {
        let inner = self.0.lock().unwrap();
        (
            inner.reconnect_strategy.clone(),
            inner.max_reconnect_attempts,
            inner.rt.clone(),
        )
    }

    fn registry(&self) -> Arc<Mutex<Registry>> {
        self.0.lock().unwrap().registry.clone()
    }

    fn send_request(
        &self,
        method: &str,
        params: Result<Value, CallError>,
        timeout: Option<Duration>,
    ) -> FutureResult<impl Future<Output = Result<Value, CallError>> + use<>> {
        let prepared = self.prepare_request(method, params);

        FutureResult(async move {
            let Prepared { reply, entry } = prepared?;

            let reply = match timeout {
                None => reply.await,
                Some(timeout) => match tokio::time::timeout(timeout, reply).await {
                    Ok(reply) => reply,
                    Err(_) => {
                        log::debug!("request id={} timed out after {:?}", entry.id, timeout);
                        return Err(CallError::Timeout);
                    }
                },
            };

            match reply {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => Err(err.into()),
                Err(_) => Err(CallError::ConnectionLost),
            }
        })
    }

    fn prepare_request(
        &self,
        method: &str,
        params: Result<Value, CallError>,
    ) -> Result<Prepared, CallError> {
        if method.is_empty() {
            return Err(CallError::InvalidMethod);
        }
        let params = params?;

        let mut inner = self.0.lock().unwrap();
        if inner.state != State::Connected || inner.connection.is_none() {
            return Err(CallError::NotConnected);
        }

        let id = inner.allocate_id();
        let message =
            encode_frame(&OutboundFrame::request(id, method, params)).map_err(CallError::Encode)?;
        let Some(connection) = inner.connection.as_ref() else {
            return Err(CallError::NotConnected);
        };

        let reply = connection.pending.insert(id)?;
        let entry = PendingEntry {
            id,
            pending: connection.pending.clone(),
        };
        Self::enqueue(&inner.rt, &connection.writer, message)?;
        log::debug!("MCP request sent: id={} method={}", id, method);

        Ok(Prepared { reply, entry })
    }

    fn prepare_notification(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(), CallError> {
        if method.is_empty() {
            return Err(CallError::InvalidMethod);
        }
        let message = encode_frame(&OutboundFrame::notification(method, params))
            .map_err(CallError::Encode)?;

        let inner = self.0.lock().unwrap();
        match inner.connection.as_ref() {
            Some(connection) if inner.state == State::Connected => {
                Self::enqueue(&inner.rt, &connection.writer, message)
            }
            _ => Err(CallError::NotConnected),
        }
    }

    /// Hands `message` to the socket writer.
    ///
    /// When the queue is full the frame waits for room in a background task,
    /// so it is sent whether or not the caller keeps polling.
    fn enqueue(
        rt: &Handle,
        writer: &mpsc::Sender<Message>,
        message: Message,
    ) -> Result<(), CallError> {
        match writer.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                let writer = writer.clone();
                rt.spawn(async move {
                    // a closed writer means the socket closed and the request was rejected
                    let _ = writer.send(message).await;
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(CallError::ConnectionLost),
        }
    }
}
