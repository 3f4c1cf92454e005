// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Request/response correlation over a single connection.
//!
//! Every outbound request gets a fresh numeric id and a one-shot slot in the
//! pending table. A background dispatch loop reads the connection, completes
//! slots as responses arrive and hands everything the server initiates to
//! the session's [`Observer`] through a separate task.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::observer::{Observer, PeerMessage};
use super::protocol::{Message, NotificationMessage, RequestId, RequestMessage, ResponseMessage};
use super::transport::{MessageReader, MessageWriter};
use crate::error::{Result, SessionError};

type Reply = Result<Value>;
type SharedWriter = Arc<tokio::sync::Mutex<MessageWriter>>;

/// Per-call knobs for [`Engine::call_with`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Deadline for the response. Falls back to the engine default.
    pub timeout: Option<Duration>,
    /// Cancelling this token abandons the call with `CallAborted`.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Options with only a deadline.
    #[must_use]
    pub const fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    /// Options with only a cancellation token.
    #[must_use]
    pub fn cancel(token: CancellationToken) -> Self {
        Self {
            timeout: None,
            cancel: Some(token),
        }
    }
}

struct PendingCall {
    method: String,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u64, PendingCall>,
    closed: bool,
}

/// Outstanding calls, keyed by request id.
///
/// Held only for map operations, never across an `.await`.
#[derive(Default)]
struct Pending(Mutex<PendingTable>);

impl Pending {
    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: u64, method: &str, reply: oneshot::Sender<Reply>) -> Result<()> {
        let mut table = self.lock();
        if table.closed {
            return Err(SessionError::SessionClosed);
        }
        table.calls.insert(
            id,
            PendingCall {
                method: method.to_string(),
                reply,
            },
        );
        Ok(())
    }

    /// Delivers `reply` to call `id`. Returns false if no such call is waiting.
    fn complete(&self, id: u64, reply: Reply) -> bool {
        let Some(call) = self.lock().calls.remove(&id) else {
            return false;
        };
        debug!("Completing call {} ({})", id, call.method);
        // The caller may have given up between removal and send.
        let _ = call.reply.send(reply);
        true
    }

    fn forget(&self, id: u64) -> Option<String> {
        self.lock().calls.remove(&id).map(|call| call.method)
    }

    /// Refuses new calls and fails every outstanding one with `SessionClosed`.
    fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut table = self.lock();
            table.closed = true;
            table.calls.drain().collect()
        };

        let count = drained.len();
        for (id, call) in drained {
            debug!("Failing call {} ({}): session closed", id, call.method);
            let _ = call.reply.send(Err(SessionError::SessionClosed));
        }
        count
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn len(&self) -> usize {
        self.lock().calls.len()
    }
}

/// Removes its call from the pending table when the waiting future goes
/// away, whether it finished, timed out, was cancelled or was dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(method) = self.pending.forget(self.id) {
            debug!("Abandoned call {} ({}); a late response will be dropped", self.id, method);
        }
    }
}

/// Multiplexes calls and notifications over one connection.
pub struct Engine {
    next_id: AtomicU64,
    writer: SharedWriter,
    pending: Arc<Pending>,
    shutdown: CancellationToken,
    default_timeout: Option<Duration>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Takes ownership of both connection halves and starts the dispatch loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        reader: MessageReader,
        writer: MessageWriter,
        observer: Arc<dyn Observer>,
        default_timeout: Option<Duration>,
    ) -> Self {
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        let pending = Arc::new(Pending::default());
        let shutdown = CancellationToken::new();

        let (observed_tx, observed_rx) = mpsc::unbounded_channel();
        tokio::spawn(observe_task(observed_rx, observer));

        let dispatch = tokio::spawn(dispatch_loop(
            reader,
            Arc::clone(&writer),
            Arc::clone(&pending),
            observed_tx,
            shutdown.clone(),
        ));

        Self {
            next_id: AtomicU64::new(1),
            writer,
            pending,
            shutdown,
            default_timeout,
            dispatch: Mutex::new(Some(dispatch)),
        }
    }

    /// Sends a request and waits for its response, using the default timeout.
    ///
    /// # Errors
    ///
    /// See [`Engine::call_with`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_with(method, params, CallOptions::default()).await
    }

    /// Sends a request and waits for its response.
    ///
    /// A `null` result is returned as [`Value::Null`]. The deadline and the
    /// cancellation token cover the write as well as the wait for the reply.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Protocol`] if the server answered with an error.
    /// - [`SessionError::CallAborted`] if `options.cancel` fired first.
    /// - [`SessionError::Timeout`] if the deadline elapsed first.
    /// - [`SessionError::SessionClosed`] if the engine shut down or lost the
    ///   connection before the response arrived.
    /// - [`SessionError::Transport`] if the request could not be written.
    pub async fn call_with(
        &self,
        method: &str,
        params: Value,
        options: CallOptions,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.pending.register(id, method, tx)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let timeout = options.timeout.or(self.default_timeout);
        let cancel = options.cancel.unwrap_or_default();

        let request = RequestMessage::new(RequestId::Number(id), method, params);
        let exchange = async {
            self.send(&request).await?;
            rx.await.unwrap_or(Err(SessionError::SessionClosed))
        };

        tokio::select! {
            biased;
            reply = exchange => reply,
            () = cancel.cancelled() => {
                debug!("Call {} ({}) cancelled by caller", id, method);
                Err(SessionError::CallAborted { method: method.to_string() })
            }
            () = sleep_or_forever(timeout) => {
                warn!("Call {} ({}) timed out after {:?}", id, method, timeout);
                Err(SessionError::Timeout {
                    method: method.to_string(),
                    after: timeout.unwrap_or_default(),
                })
            }
        }
    }

    /// Sends a notification. Returns once it has been written.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionClosed`] after shutdown or connection loss,
    /// [`SessionError::Transport`] if the write fails.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        if self.pending.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        self.send(&NotificationMessage::new(method, params)).await
    }

    async fn send<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        let result = self.writer.lock().await.send(message).await;
        result.map_err(|e| {
            if self.pending.is_closed() {
                SessionError::SessionClosed
            } else {
                SessionError::Transport(e)
            }
        })
    }

    /// Stops the dispatch loop, fails every outstanding call with
    /// `SessionClosed` and closes the connection. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let dispatch = self
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(dispatch) = dispatch else {
            return;
        };

        if let Err(e) = dispatch.await {
            error!("Dispatch loop ended abnormally: {}", e);
        }

        let failed = self.pending.close();
        if failed > 0 {
            debug!("Failed {} pending calls during shutdown", failed);
        }

        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Error closing transport: {}", e);
        }
    }

    /// True while the dispatch loop is running and new calls are accepted.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.pending.is_closed()
    }

    /// Number of calls currently waiting for a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Reads the connection until shutdown, EOF or a transport error.
async fn dispatch_loop(
    mut reader: MessageReader,
    writer: SharedWriter,
    pending: Arc<Pending>,
    observed: mpsc::UnboundedSender<PeerMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let body = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("Dispatch loop stopping: shutdown requested");
                break;
            }
            received = reader.receive() => match received {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!("Server closed the connection");
                    break;
                }
                // Socket and framing errors leave the stream out of sync.
                // Undecodable bodies are dropped below instead.
                Err(e) => {
                    error!("Error reading from server: {}", e);
                    break;
                }
            },
        };

        match Message::parse(&body) {
            Ok(Message::Response(response)) => route_response(&pending, response),
            Ok(Message::Notification(notification)) => {
                let _ = observed.send(PeerMessage {
                    method: notification.method,
                    id: None,
                    params: notification.params,
                });
            }
            Ok(Message::Request(request)) => {
                debug!("Received server request: {} (id: {})", request.method, request.id);
                decline(&writer, request.id.clone(), &request.method);
                let _ = observed.send(PeerMessage {
                    method: request.method,
                    id: Some(request.id),
                    params: request.params,
                });
            }
            Err(e) => warn!("Dropping malformed message: {}", e),
        }
    }

    let failed = pending.close();
    if failed > 0 {
        warn!("Connection lost with {} calls outstanding", failed);
    }
}

fn route_response(pending: &Pending, response: ResponseMessage) {
    let id = match response.id {
        Some(RequestId::Number(id)) => id,
        other => {
            warn!("Dropping response with unusable id: {:?}", other);
            return;
        }
    };

    let reply = match response.error {
        Some(error) => Err(SessionError::Protocol {
            code: error.code,
            message: error.message,
            data: error.data,
        }),
        None => Ok(response.result.unwrap_or(Value::Null)),
    };

    if !pending.complete(id, reply) {
        warn!("Received response for unknown request id: {}", id);
    }
}

/// Answers a server request with `MethodNotFound` so the server is not left
/// waiting. Written from its own task to keep the read loop moving.
fn decline(writer: &SharedWriter, id: RequestId, method: &str) {
    let reply = ResponseMessage::method_not_found(id, method);
    let writer = Arc::clone(writer);
    tokio::spawn(async move {
        if let Err(e) = writer.lock().await.send(&reply).await {
            warn!("Failed to answer server request: {}", e);
        }
    });
}

async fn observe_task(
    mut observed: mpsc::UnboundedReceiver<PeerMessage>,
    observer: Arc<dyn Observer>,
) {
    while let Some(message) = observed.recv().await {
        if let Err(e) = observer.observe(&message) {
            warn!("Observer failed on {}: {:#}", message.method, e);
        }
    }
}
