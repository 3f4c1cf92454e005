// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A single logical connection to one language server.

use lsp_types::{
    CompletionItem, CompletionResponse, Hover, InitializeResult, InitializedParams,
    ServerCapabilities, ServerInfo,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::engine::{CallOptions, Engine};
use super::observer::Observer;
use super::requests::{self, Identity};
use super::state::SessionState;
use super::transport::Endpoint;
use crate::error::{Result, SessionError};

/// Default deadline for a single request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for the graceful `shutdown` exchange.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed settings of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where the server listens.
    pub endpoint: Endpoint,
    /// Deadline applied to every request unless overridden per call.
    /// `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Deadline for the `shutdown` request sent while closing.
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    /// Settings with default timeouts.
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            request_timeout: Some(REQUEST_TIMEOUT),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }
}

struct Lifecycle {
    state: SessionState,
    engine: Option<Arc<Engine>>,
    server: Option<InitializeResult>,
    workspace: Option<Identity>,
}

impl Lifecycle {
    fn advance(&mut self, next: SessionState) {
        if self.state.can_advance_to(next) {
            info!("Session state: {} -> {}", self.state, next);
            self.state = next;
        } else {
            warn!("Ignoring illegal session transition {} -> {}", self.state, next);
        }
    }

    fn engine(&self) -> Result<Arc<Engine>> {
        self.engine.clone().ok_or(SessionError::NotStarted)
    }
}

/// One client connection to a language server.
///
/// Create with [`Session::new`], then [`start`](Session::start),
/// [`handshake`](Session::handshake), use the document and query operations,
/// and finally [`shutdown`](Session::shutdown). All methods take `&self`, so
/// a session can be shared behind an `Arc` and called concurrently.
pub struct Session {
    config: SessionConfig,
    observer: Arc<dyn Observer>,
    /// Never held across a server round trip, so `shutdown` is always
    /// reachable.
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    /// Serializes handshakes. `shutdown` does not take it.
    handshake: tokio::sync::Mutex<()>,
    /// Serializes document notifications so versions hit the wire in order.
    edits: tokio::sync::Mutex<()>,
    versions: Mutex<HashMap<String, i32>>,
}

impl Session {
    /// Creates an unstarted session. Nothing is dialed yet.
    pub fn new(config: SessionConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            config,
            observer,
            lifecycle: tokio::sync::Mutex::new(Lifecycle {
                state: SessionState::Unstarted,
                engine: None,
                server: None,
                workspace: None,
            }),
            handshake: tokio::sync::Mutex::new(()),
            edits: tokio::sync::Mutex::new(()),
            versions: Mutex::new(HashMap::new()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.lifecycle.lock().await.state
    }

    /// Server name and version reported during the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.lifecycle
            .lock()
            .await
            .server
            .as_ref()
            .and_then(|result| result.server_info.clone())
    }

    /// Capabilities advertised by the server during the handshake.
    pub async fn capabilities(&self) -> Option<ServerCapabilities> {
        self.lifecycle
            .lock()
            .await
            .server
            .as_ref()
            .map(|result| result.capabilities.clone())
    }

    /// The identity the handshake was performed with.
    pub async fn workspace(&self) -> Option<Identity> {
        self.lifecycle.lock().await.workspace.clone()
    }

    /// Connects to the server and starts the dispatch loop.
    ///
    /// Calling it again while started is a no-op.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Dial`] if the endpoint cannot be reached; the
    ///   session stays unstarted.
    /// - [`SessionError::SessionClosed`] once shutdown has begun.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        match lifecycle.state {
            SessionState::Unstarted => {}
            state if state.is_running() => {
                info!("Session already started ({}), ignoring start", state);
                return Ok(());
            }
            _ => return Err(SessionError::SessionClosed),
        }

        info!(
            "Starting session: {} {}",
            self.config.endpoint.network, self.config.endpoint.address
        );
        let (reader, writer) = self.config.endpoint.connect().await?;

        lifecycle.engine = Some(Arc::new(Engine::start(
            reader,
            writer,
            Arc::clone(&self.observer),
            self.config.request_timeout,
        )));
        lifecycle.advance(SessionState::Started);

        Ok(())
    }

    /// Performs `initialize` then `initialized`, after which the session is
    /// ready. Once ready, repeat calls return the recorded result.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotStarted`] before [`start`](Session::start).
    /// - [`SessionError::SessionClosed`] once shutdown has begun.
    /// - Any call error from `initialize`; the session stays started and the
    ///   caller may retry.
    ///
    /// A concurrent [`shutdown`](Session::shutdown) aborts the exchange with
    /// [`SessionError::SessionClosed`].
    pub async fn handshake(&self, identity: &Identity) -> Result<InitializeResult> {
        let _handshake = self.handshake.lock().await;

        let engine = {
            let lifecycle = self.lifecycle.lock().await;
            match lifecycle.state {
                SessionState::Unstarted => return Err(SessionError::NotStarted),
                SessionState::Ready => {
                    debug!("Handshake already complete");
                    return lifecycle.server.clone().ok_or(SessionError::NotReady {
                        state: lifecycle.state,
                    });
                }
                state if state.is_terminating() => return Err(SessionError::SessionClosed),
                _ => lifecycle.engine()?,
            }
        };

        info!(
            "Initializing workspace {} ({})",
            identity.workspace_name, identity.workspace_uri
        );

        let params = requests::initialize(identity)?;
        let result = engine
            .call(requests::INITIALIZE, requests::encode(requests::INITIALIZE, &params)?)
            .await?;
        let result: InitializeResult = requests::decode(requests::INITIALIZE, result)?;

        engine
            .notify(
                requests::INITIALIZED,
                requests::encode(requests::INITIALIZED, &InitializedParams {})?,
            )
            .await?;

        if let Some(server) = &result.server_info {
            info!(
                "Connected to {} {}",
                server.name,
                server.version.as_deref().unwrap_or("(unknown version)")
            );
        }

        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != SessionState::Started {
            debug!("Session moved to {} during the handshake", lifecycle.state);
            return Err(SessionError::SessionClosed);
        }
        lifecycle.server = Some(result.clone());
        lifecycle.workspace = Some(identity.clone());
        lifecycle.advance(SessionState::Ready);

        Ok(result)
    }

    async fn ready_engine(&self) -> Result<Arc<Engine>> {
        let lifecycle = self.lifecycle.lock().await;
        match lifecycle.state {
            SessionState::Unstarted => Err(SessionError::NotStarted),
            SessionState::Started => Err(SessionError::NotReady {
                state: lifecycle.state,
            }),
            SessionState::Ready => lifecycle.engine(),
            _ => Err(SessionError::SessionClosed),
        }
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: &P) -> Result<R> {
        let engine = self.ready_engine().await?;
        let result = engine
            .call(method, requests::encode(method, params)?)
            .await?;
        requests::decode(method, result)
    }

    async fn send_notification<P: Serialize>(&self, method: &str, params: &P) -> Result<()> {
        let engine = self.ready_engine().await?;
        engine.notify(method, requests::encode(method, params)?).await
    }

    /// Reserves and records the next version of `uri`.
    fn bump_version(&self, uri: &str) -> i32 {
        let mut versions = self.versions.lock().unwrap_or_else(PoisonError::into_inner);
        let version = versions.entry(uri.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    /// Current version of an open document.
    #[must_use]
    pub fn document_version(&self, uri: &str) -> Option<i32> {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .copied()
    }

    /// Tells the server about a document, at version 0.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, [`SessionError::InvalidUri`], or a transport failure.
    pub async fn open_document(&self, uri: &str, language: &str, text: &str) -> Result<()> {
        debug!("Opening document {} ({})", uri, language);
        let params = requests::did_open(uri, language, 0, text)?;
        let _edits = self.edits.lock().await;
        self.send_notification(requests::DID_OPEN, &params).await?;

        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), 0);
        Ok(())
    }

    /// Replaces the full text of an open document. Returns the new version.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, [`SessionError::InvalidUri`], or a transport failure.
    ///
    /// A version is used up even if sending fails, so the next change is
    /// still strictly newer.
    pub async fn change_document(&self, uri: &str, text: &str) -> Result<i32> {
        let mut params = requests::did_change(uri, 0, text)?;
        let engine = self.ready_engine().await?;

        let _edits = self.edits.lock().await;
        if self.document_version(uri).is_none() {
            warn!("Changing document {} that was never opened", uri);
        }
        let version = self.bump_version(uri);
        params.text_document.version = version;
        engine
            .notify(requests::DID_CHANGE, requests::encode(requests::DID_CHANGE, &params)?)
            .await?;
        Ok(version)
    }

    /// Notifies the server that a document was saved with `text`.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, [`SessionError::InvalidUri`], or a transport failure.
    pub async fn save_document(&self, uri: &str, text: &str) -> Result<()> {
        debug!("Saving document {}", uri);
        let params = requests::did_save(uri, text)?;
        let _edits = self.edits.lock().await;
        self.send_notification(requests::DID_SAVE, &params).await?;
        self.bump_version(uri);
        Ok(())
    }

    /// Tells the server the document is no longer open.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, [`SessionError::InvalidUri`], or a transport failure.
    pub async fn close_document(&self, uri: &str) -> Result<()> {
        let params = requests::did_close(uri)?;
        let _edits = self.edits.lock().await;
        self.send_notification(requests::DID_CLOSE, &params).await?;
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri);
        Ok(())
    }

    /// Runs a server-side command. Arguments and result are opaque JSON.
    ///
    /// # Errors
    ///
    /// Lifecycle errors or any call error.
    pub async fn execute_command(&self, command: &str, arguments: Vec<Value>) -> Result<Value> {
        info!("Executing command {}", command);
        let params = requests::execute_command(command, arguments);
        let result: Option<Value> = self.call(requests::EXECUTE_COMMAND, &params).await?;
        Ok(result.unwrap_or(Value::Null))
    }

    /// Completion candidates at a zero-based position.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, [`SessionError::InvalidUri`], or any call error.
    pub async fn query_completion(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<CompletionItem>> {
        let params = requests::completion(uri, line, character)?;
        let response: Option<CompletionResponse> =
            self.call(requests::COMPLETION, &params).await?;
        let items = requests::completion_items(response);
        debug!("{} completion candidates at {}:{}:{}", items.len(), uri, line, character);
        Ok(items)
    }

    /// Hover information at a zero-based position.
    ///
    /// # Errors
    ///
    /// Lifecycle errors, [`SessionError::InvalidUri`], or any call error.
    pub async fn hover(&self, uri: &str, line: u32, character: u32) -> Result<Option<Hover>> {
        let params = requests::hover(uri, line, character)?;
        self.call(requests::HOVER, &params).await
    }

    /// Sends an arbitrary request and returns its raw result.
    ///
    /// # Errors
    ///
    /// Lifecycle errors or any call error.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with(method, params, CallOptions::default())
            .await
    }

    /// Like [`request`](Session::request), with a per-call deadline or
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// Lifecycle errors or any call error.
    pub async fn request_with(
        &self,
        method: &str,
        params: Value,
        options: CallOptions,
    ) -> Result<Value> {
        let engine = self.ready_engine().await?;
        engine.call_with(method, params, options).await
    }

    /// Sends an arbitrary notification.
    ///
    /// # Errors
    ///
    /// Lifecycle errors or a transport failure.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let engine = self.ready_engine().await?;
        engine.notify(method, params).await
    }

    /// Closes the session: polite `shutdown`/`exit` if the handshake was
    /// done, then fails outstanding calls and closes the connection.
    /// Repeat calls are no-ops.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotStarted`] if the session was never started.
    pub async fn shutdown(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let was_ready = match lifecycle.state {
            SessionState::Unstarted => return Err(SessionError::NotStarted),
            state if state.is_terminating() => {
                debug!("Session already closed, ignoring shutdown");
                return Ok(());
            }
            state => state == SessionState::Ready,
        };

        lifecycle.advance(SessionState::ShuttingDown);

        if let Some(engine) = lifecycle.engine.take() {
            if was_ready && engine.is_alive() {
                self.say_goodbye(&engine).await;
            }
            engine.shutdown().await;
        }

        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        lifecycle.advance(SessionState::Closed);
        info!("Session closed");

        Ok(())
    }

    async fn say_goodbye(&self, engine: &Engine) {
        let options = CallOptions::timeout(self.config.shutdown_timeout);
        match engine
            .call_with(requests::SHUTDOWN, Value::Null, options)
            .await
        {
            Ok(_) => {
                if let Err(e) = engine.notify(requests::EXIT, Value::Null).await {
                    debug!("Failed to send exit: {}", e);
                }
            }
            Err(e) => warn!("Server did not acknowledge shutdown: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::observer::NoopObserver;
    use crate::lsp::transport::{MessageReader, MessageWriter};
    use anyhow::Context;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn identity() -> Identity {
        Identity::new("client", "1.0", "ws", "file:///ws")
    }

    /// Serves one client on loopback. Answers `shutdown`, and `initialize`
    /// unless told to hang, and forwards every message it receives.
    async fn scripted_server(
        answer_initialize: bool,
    ) -> anyhow::Result<(String, mpsc::UnboundedReceiver<Value>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?.to_string();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (r, w) = stream.into_split();
            let mut reader = MessageReader::new(r);
            let mut writer = MessageWriter::new(w);

            while let Ok(Some(body)) = reader.receive().await {
                let Ok(message) = serde_json::from_slice::<Value>(&body) else {
                    continue;
                };
                let result = match message["method"].as_str() {
                    Some("initialize") if answer_initialize => Some(json!({"capabilities": {}})),
                    Some("shutdown") => Some(Value::Null),
                    _ => None,
                };
                if let Some(result) = result {
                    let reply = json!({"jsonrpc": "2.0", "id": message["id"], "result": result});
                    if writer.send(&reply).await.is_err() {
                        return;
                    }
                }
                if seen_tx.send(message).is_err() {
                    return;
                }
            }
        });

        Ok((address, seen_rx))
    }

    fn unstarted() -> Session {
        Session::new(
            SessionConfig::new(Endpoint::tcp("127.0.0.1:1")),
            Arc::new(NoopObserver),
        )
    }

    #[tokio::test]
    async fn test_operations_before_start_fail_not_started() {
        let session = unstarted();
        assert_eq!(session.state().await, SessionState::Unstarted);

        let identity = Identity::new("client", "1.0", "ws", "file:///ws");
        assert!(matches!(session.handshake(&identity).await, Err(SessionError::NotStarted)));
        assert!(matches!(
            session.open_document("file:///ws/a.txt", "text", "hello").await,
            Err(SessionError::NotStarted)
        ));
        assert!(matches!(
            session.execute_command("echo", Vec::new()).await,
            Err(SessionError::NotStarted)
        ));
        assert!(matches!(session.shutdown().await, Err(SessionError::NotStarted)));
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_session_unstarted() {
        let session = unstarted();
        assert!(matches!(session.start().await, Err(SessionError::Dial { .. })));
        assert_eq!(session.state().await, SessionState::Unstarted);
    }

    #[test]
    fn test_default_timeouts() {
        let config = SessionConfig::new(Endpoint::tcp("localhost:9877"));
        assert_eq!(config.request_timeout, Some(REQUEST_TIMEOUT));
        assert_eq!(config.shutdown_timeout, SHUTDOWN_TIMEOUT);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_a_hung_handshake() -> anyhow::Result<()> {
        let (address, mut seen) = scripted_server(false).await?;
        let mut config = SessionConfig::new(Endpoint::tcp(address));
        config.request_timeout = None;
        let session = Arc::new(Session::new(config, Arc::new(NoopObserver)));
        session.start().await?;

        let handshake = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.handshake(&identity()).await })
        };
        let first = seen.recv().await.context("server saw nothing")?;
        assert_eq!(first["method"], "initialize");

        // The lifecycle stays reachable while initialize is outstanding.
        let state = tokio::time::timeout(Duration::from_secs(1), session.state()).await?;
        assert_eq!(state, SessionState::Started);

        tokio::time::timeout(Duration::from_secs(2), session.shutdown()).await??;
        let outcome = tokio::time::timeout(Duration::from_secs(2), handshake).await??;
        assert!(matches!(outcome, Err(SessionError::SessionClosed)), "got {outcome:?}");
        assert_eq!(session.state().await, SessionState::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_changes_get_distinct_ordered_versions() -> anyhow::Result<()> {
        let (address, mut seen) = scripted_server(true).await?;
        let session = Arc::new(Session::new(
            SessionConfig::new(Endpoint::tcp(address)),
            Arc::new(NoopObserver),
        ));
        session.start().await?;
        session.handshake(&identity()).await?;

        let uri = "file:///ws/a.txt";
        session.open_document(uri, "text", "v0").await?;

        let changes: Vec<_> = (1..=10)
            .map(|i| {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.change_document(uri, &format!("v{i}")).await })
            })
            .collect();
        let mut returned = Vec::new();
        for change in changes {
            returned.push(change.await??);
        }
        returned.sort_unstable();
        assert_eq!(returned, (1..=10).collect::<Vec<i32>>());
        assert_eq!(session.document_version(uri), Some(10));

        // Versions reach the server strictly increasing.
        let mut wire = Vec::new();
        while wire.len() < 10 {
            let message = seen.recv().await.context("server stopped early")?;
            if message["method"] == "textDocument/didChange" {
                let version = message["params"]["textDocument"]["version"].as_i64();
                wire.push(version.context("didChange without a version")?);
            }
        }
        assert_eq!(wire, (1..=10).collect::<Vec<i64>>());

        session.shutdown().await?;
        Ok(())
    }
}
