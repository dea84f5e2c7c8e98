use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::protocol::{Frame, RpcError};
use crate::utils::decode_frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplyError {
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Server(RpcError),
}

type ReplySender = oneshot::Sender<Result<Value, ReplyError>>;

/// Requests sent on one socket and still waiting for their response.
///
/// Once closed, every waiting request has been rejected and no new one can
/// be registered, so a request can never outlive its socket unanswered.
pub(crate) struct PendingMap {
    inner: Mutex<PendingInner>,
}

struct PendingInner {
    closed: bool,
    map: HashMap<u64, ReplySender>,
}

impl PendingMap {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(PendingInner {
                closed: false,
                map: HashMap::new(),
            }),
        }
    }

    pub(crate) fn insert(
        &self,
        id: u64,
    ) -> Result<oneshot::Receiver<Result<Value, ReplyError>>, ReplyError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ReplyError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        let previous = inner.map.insert(id, tx);
        debug_assert!(previous.is_none(), "request id {id} issued twice");
        Ok(rx)
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        self.inner.lock().unwrap().map.remove(&id).is_some()
    }

    /// Settles request `id`. Returns `false` if no such request is waiting.
    pub(crate) fn settle(&self, id: u64, outcome: Result<Value, ReplyError>) -> bool {
        let reply_ch = self.inner.lock().unwrap().map.remove(&id);
        match reply_ch {
            Some(reply_ch) => {
                let _ = reply_ch.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Rejects every waiting request with [`ReplyError::Closed`].
    pub(crate) fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = true;
            inner.map.drain().collect()
        };
        let count = drained.len();
        for (_, reply_ch) in drained {
            let _ = reply_ch.send(Err(ReplyError::Closed));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}

/// Dispatches one inbound message.
pub(crate) fn handle_message(
    data: &[u8],
    pending: &PendingMap,
    on_notification: &impl Fn(String, Value),
    on_error: &impl Fn(anyhow::Error),
) {
    let frame = match decode_frame(data) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("failed to parse MCP message: {}", err);
            on_error(err);
            return;
        }
    };

    match frame {
        Frame::Response { id, outcome } => {
            if !pending.settle(id, outcome.map_err(ReplyError::Server)) {
                log::debug!("unknown reply id={}", id);
            }
        }
        Frame::Notification { method, params } => on_notification(method, params),
        Frame::Either {
            id,
            outcome,
            method,
            params,
        } => {
            if !pending.settle(id, outcome.map_err(ReplyError::Server)) {
                on_notification(method, params);
            }
        }
        Frame::Unrecognized(raw) => {
            log::debug!("unrecognized frame: {:?}", raw);
        }
    }
}

/// Runs one open socket until it closes.
///
/// Reads are dispatched to `pending` or `on_notification`; frames received
/// on `outbound` are written as they come. The socket closes when the
/// remote side closes it, on a read or write error, or when `closer_ch`
/// fires. `on_closed` runs first, then every request still waiting is
/// rejected.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn websocket_handler(
    rt: tokio::runtime::Handle,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::Receiver<Message>,
    closer_write: mpsc::Sender<()>,
    mut closer_ch: mpsc::Receiver<()>,
    pending: Arc<PendingMap>,
    on_notification: impl Fn(String, Value) + Send + Sync + 'static,
    on_error: impl Fn(anyhow::Error) + Send + Sync + 'static,
    on_closed: impl FnOnce(),
) {
    let (mut write_ws, mut read_ws) = stream.split();
    let (stop_write, mut stop_read) = mpsc::channel::<()>(1);
    let on_error_arc = Arc::new(on_error);

    let on_error = on_error_arc.clone();
    let reader_pending = pending.clone();
    let reader_task = rt.spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = closer_ch.recv() => {
                    log::debug!("closing connection on request");
                    break;
                }

                remote_msg = read_ws.next() => {
                    let message = match remote_msg {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            log::debug!("failed to read message: {}", err);
                            on_error(anyhow!(err));
                            break;
                        }
                        None => break,
                    };

                    match message {
                        Message::Text(text) => {
                            handle_message(text.as_bytes(), &reader_pending, &on_notification, &*on_error);
                        }
                        Message::Binary(bin) => {
                            handle_message(&bin, &reader_pending, &on_notification, &*on_error);
                        }
                        Message::Close(close_frame) => {
                            if let Some(close_frame) = close_frame {
                                let code: u16 = close_frame.code.into();
                                log::debug!("connection closed by remote, code={code}, reason={}", close_frame.reason);
                            } else {
                                log::debug!("connection closed by remote");
                            }
                            break;
                        }
                        _ => continue,
                    }
                }
            }
        }

        drop(stop_write);
        read_ws
    });

    let on_error = on_error_arc;
    let writer_task = rt.spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = stop_read.recv() => break,

                message = outbound.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if let Err(err) = write_ws.send(message).await {
                        log::debug!("failed to write message: {}", err);
                        on_error(anyhow!(err));
                        // the reader owns the connection lifetime
                        let _ = closer_write.try_send(());
                        break;
                    }
                }
            }
        }

        write_ws
    });

    let (read_ws, write_ws) = tokio::join!(reader_task, writer_task);

    on_closed();
    let rejected = pending.close();
    if rejected > 0 {
        log::debug!("rejected {} pending request(s) on close", rejected);
    }

    if let (Ok(read_ws), Ok(write_ws)) = (read_ws, write_ws) {
        if let Ok(mut stream) = read_ws.reunite(write_ws) {
            let _ = stream.close(None).await;
        }
        log::debug!("websocket connection closed");
    } else {
        log::debug!("websocket connection aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn no_error(err: anyhow::Error) {
        panic!("unexpected error: {err}");
    }

    #[test]
    fn response_settles_matching_request_only() {
        let pending = PendingMap::new();
        let mut first = pending.insert(1).unwrap();
        let mut second = pending.insert(2).unwrap();

        handle_message(br#"{"id":2,"result":"two"}"#, &pending, &|_, _| {}, &no_error);

        assert_eq!(second.try_recv().unwrap(), Ok(json!("two")));
        assert!(first.try_recv().is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let pending = PendingMap::new();
        let mut rx = pending.insert(5).unwrap();

        handle_message(
            br#"{"id":5,"error":{"code":-32602,"message":"Tool name is required."}}"#,
            &pending,
            &|_, _| {},
            &no_error,
        );

        let Err(ReplyError::Server(err)) = rx.try_recv().unwrap() else {
            panic!("expected server error");
        };
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Tool name is required.");
    }

    #[test]
    fn malformed_frame_touches_nothing() {
        let pending = PendingMap::new();
        let mut rx = pending.insert(1).unwrap();
        let errors = RefCell::new(0);

        handle_message(b"not json", &pending, &|_, _| panic!("no notification"), &|_| {
            *errors.borrow_mut() += 1;
        });

        assert_eq!(*errors.borrow(), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn notification_is_forwarded() {
        let pending = PendingMap::new();
        let seen = RefCell::new(Vec::new());

        handle_message(
            br#"{"jsonrpc":"2.0","method":"analysis/progress","params":{"status":"starting","message":"go"}}"#,
            &pending,
            &|method, params| seen.borrow_mut().push((method, params)),
            &no_error,
        );

        assert_eq!(
            *seen.borrow(),
            vec![("analysis/progress".to_string(), json!({"status": "starting", "message": "go"}))]
        );
    }

    #[test]
    fn id_and_method_settles_pending_request_first() {
        let pending = PendingMap::new();
        let mut rx = pending.insert(1).unwrap();
        let notified = RefCell::new(0);

        handle_message(
            br#"{"id":1,"method":"x","result":5}"#,
            &pending,
            &|_, _| *notified.borrow_mut() += 1,
            &no_error,
        );
        assert_eq!(rx.try_recv().unwrap(), Ok(json!(5)));
        assert_eq!(*notified.borrow(), 0);
        assert_eq!(pending.len(), 0);

        // no request waits for id 2, so the same shape is a notification
        handle_message(
            br#"{"id":2,"method":"x","params":{"a":1}}"#,
            &pending,
            &|method, params| {
                assert_eq!(method, "x");
                assert_eq!(params, json!({"a": 1}));
                *notified.borrow_mut() += 1;
            },
            &no_error,
        );
        assert_eq!(*notified.borrow(), 1);
    }

    #[test]
    fn close_rejects_all_and_blocks_new_requests() {
        let pending = PendingMap::new();
        let mut a = pending.insert(1).unwrap();
        let mut b = pending.insert(2).unwrap();

        assert_eq!(pending.close(), 2);

        assert_eq!(a.try_recv().unwrap(), Err(ReplyError::Closed));
        assert_eq!(b.try_recv().unwrap(), Err(ReplyError::Closed));
        assert_eq!(pending.insert(3).unwrap_err(), ReplyError::Closed);
        // late frame after close settles nothing
        assert!(!pending.settle(1, Ok(Value::Null)));
    }
}
