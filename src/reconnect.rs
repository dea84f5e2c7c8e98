//! Automatic reconnection.
//!
//! The client itself never reconnects: a dropped socket simply moves it to
//! `Disconnected`. A [`Reconnector`] watches the status of one client and
//! calls [`Client::connect`] again after a backoff delay, as long as the
//! application still wants a connection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use phr_mcp::client::Client;
//! use phr_mcp::config::Config;
//! use phr_mcp::reconnect::Reconnector;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = Client::new("ws://127.0.0.1:8000/mcp", Config::new());
//! let reconnector = Reconnector::spawn(&client);
//! let _ = client.connect().await;
//! // ...
//! reconnector.stop();
//! client.dispose();
//! # }
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::client::{Client, State};
use crate::subscription::Subscription;

/// Supervisor that reconnects a client after unexpected disconnects.
///
/// Delays come from [`Config::reconnect_strategy`](crate::config::Config::reconnect_strategy)
/// and attempts stop after
/// [`Config::max_reconnect_attempts`](crate::config::Config::max_reconnect_attempts)
/// consecutive failures. A successful connection resets the count, and so
/// does a [`Client::connect`] made by the application after giving up.
///
/// After [`Client::disconnect`] nothing is retried until the next explicit
/// [`Client::connect`]. Dropping the reconnector stops it.
pub struct Reconnector {
    subscription: Subscription,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Reconnector {
    /// Starts supervising `client`.
    pub fn spawn(client: &Client) -> Self {
        let (strategy, max_attempts, rt) = client.reconnect_policy();

        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let subscription = client.on_status_change(move |state| {
            let _ = status_tx.send(state);
        });

        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let client = client.clone();

        let task = rt.spawn(async move {
            let mut failures = 0u32;
            let mut own_attempt = false;
            loop {
                let state = tokio::select! {
                    biased;
                    _ = &mut stop_rx => return,
                    state = status_rx.recv() => match state {
                        Some(state) => state,
                        None => return,
                    },
                };

                match state {
                    State::Connected => failures = 0,
                    // an attempt started by the application gets a fresh budget
                    State::Connecting if !own_attempt => failures = 0,
                    State::Connecting => own_attempt = false,
                    State::Disconnected => {
                        if !client.wants_connection() {
                            continue;
                        }
                        failures += 1;
                        if max_attempts.is_some_and(|max| failures > max) {
                            log::warn!("giving up reconnecting after {} attempts", failures - 1);
                            continue;
                        }

                        let delay = strategy.time_before_next_attempt(failures);
                        log::debug!("reconnecting, attempt={} delay={:?}", failures, delay);
                        tokio::select! {
                            biased;
                            _ = &mut stop_rx => return,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        if client.wants_connection() && client.state() == State::Disconnected {
                            own_attempt = true;
                            let _ = client.connect();
                        }
                    }
                }
            }
        });

        Self {
            subscription,
            stop: Some(stop),
            task,
        }
    }

    /// Stops supervising. An attempt already started is left to finish.
    pub fn stop(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
