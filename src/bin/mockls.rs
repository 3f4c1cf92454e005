// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A configurable mock LSP server for testing.
//!
//! Listens on a TCP socket, accepts a single client and speaks
//! Content-Length framed JSON-RPC with it. CLI flags control timing and
//! failure modes. No tokio, uses `std::thread` for delayed replies.
//!
//! Every message received is reported on stdout, one line each, so tests can
//! assert on what reached the server:
//!
//! ```text
//! listening 127.0.0.1:40125
//! request initialize
//! notify initialized
//! reply 1 error -32601
//! closed
//! ```
//!
//! `workspace/executeCommand` understands a few commands:
//!
//! - `echo`: returns its first argument.
//! - `sleep`: `{"ms": N, "value": V}` returns `V` after `N` milliseconds,
//!   without blocking other requests.
//! - `drop`: closes the connection without replying.
//! - `request`: sends a `workspace/configuration` request to the client, then
//!   returns null.

#![allow(clippy::print_stdout, reason = "events are reported on stdout")]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const INVALID_PARAMS: i64 = -32602;
const METHOD_NOT_FOUND: i64 = -32601;
const INTERNAL_ERROR: i64 = -32603;
const SERVER_NOT_INITIALIZED: i64 = -32002;

/// Mock LSP server for integration testing.
#[derive(Parser, Debug)]
#[command(name = "mockls")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Sleep before every response (milliseconds).
    #[arg(long, default_value_t = 0)]
    response_delay: u64,

    /// Never respond to this method (repeatable).
    #[arg(long)]
    hang_on: Vec<String>,

    /// Return `InternalError` for this method (repeatable).
    #[arg(long)]
    fail_on: Vec<String>,

    /// Send this text as `window/logMessage` after `initialized`.
    #[arg(long)]
    log_message: Option<String>,
}

/// Any inbound JSON-RPC message.
#[derive(Debug, Deserialize)]
struct Incoming {
    #[allow(dead_code, reason = "Required by JSON-RPC protocol")]
    jsonrpc: String,
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    error: Option<Value>,
}

/// A JSON-RPC response.
#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError { code, message }),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Thread-safe writer handle. Wraps the socket or stdout for production,
/// or a shared `Vec<u8>` for tests.
type Writer = Arc<Mutex<Box<dyn Write + Send>>>;

fn shared<W: Write + Send + 'static>(inner: W) -> Writer {
    Arc::new(Mutex::new(Box::new(inner)))
}

#[cfg(test)]
fn buffer_writer() -> (Writer, Arc<Mutex<Vec<u8>>>) {
    let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
    (shared(SharedVecWriter(buf.clone())), buf)
}

/// Write adapter for `Arc<Mutex<Vec<u8>>>` used in tests.
#[cfg(test)]
struct SharedVecWriter(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Write for SharedVecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Why the read loop stopped.
#[derive(Debug, PartialEq, Eq)]
enum Stop {
    Eof,
    Dropped,
}

/// Shared state for the mock server.
struct MockServer {
    args: Args,
    documents: HashMap<String, String>,
    initialized: bool,
    writer: Writer,
    events: Writer,
    next_request_id: Arc<AtomicU64>,
}

impl MockServer {
    fn new(args: Args, writer: Writer, events: Writer) -> Self {
        Self {
            args,
            documents: HashMap::new(),
            initialized: false,
            writer,
            events,
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Serve one client until it disconnects or asks to be dropped.
    fn run(&mut self, reader: &mut dyn Read) -> Stop {
        let mut buffer = Vec::new();
        let mut temp = [0u8; 4096];

        let stop = 'outer: loop {
            match reader.read(&mut temp) {
                Ok(0) | Err(_) => break Stop::Eof,
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
            }

            while let Some((message, consumed)) = try_parse_message(&buffer) {
                buffer.drain(..consumed);

                let Ok(incoming) = serde_json::from_str::<Incoming>(&message) else {
                    self.emit("malformed");
                    continue;
                };

                if self.handle_message(incoming) == Some(Stop::Dropped) {
                    break 'outer Stop::Dropped;
                }
            }
        };

        self.emit("closed");
        stop
    }

    fn emit(&self, line: &str) {
        let Ok(mut w) = self.events.lock() else { return };
        let _ = writeln!(w, "{line}");
        let _ = w.flush();
    }

    fn handle_message(&mut self, incoming: Incoming) -> Option<Stop> {
        match (incoming.method.clone(), incoming.id.clone()) {
            (Some(method), Some(id)) => {
                self.emit(&format!("request {method}"));
                self.handle_request(&method, id, &incoming.params)
            }
            (Some(method), None) => {
                self.emit(&format!("notify {method}"));
                self.handle_notification(&method, &incoming.params);
                None
            }
            (None, Some(id)) => {
                let outcome = incoming
                    .error
                    .as_ref()
                    .and_then(|e| e.get("code"))
                    .map_or_else(|| "ok".to_string(), |code| format!("error {code}"));
                self.emit(&format!("reply {id} {outcome}"));
                None
            }
            (None, None) => None,
        }
    }

    fn handle_request(&mut self, method: &str, id: Value, params: &Value) -> Option<Stop> {
        // Check hang_on: never respond
        if self.args.hang_on.iter().any(|m| m == method) {
            return None;
        }

        // Response delay
        if self.args.response_delay > 0 {
            std::thread::sleep(Duration::from_millis(self.args.response_delay));
        }

        // Check fail_on: return `InternalError`
        if self.args.fail_on.iter().any(|m| m == method) {
            self.send_response(&Response::err(
                id,
                INTERNAL_ERROR,
                format!("mockls: configured to fail on {method}"),
            ));
            return None;
        }

        if !self.initialized && method != "initialize" {
            self.send_response(&Response::err(
                id,
                SERVER_NOT_INITIALIZED,
                format!("mockls: {method} before initialize"),
            ));
            return None;
        }

        let result = match method {
            "initialize" => {
                self.initialized = true;
                Self::handle_initialize()
            }
            "shutdown" => Value::Null,
            "textDocument/hover" => self.handle_hover(params),
            "textDocument/completion" => self.handle_completion(params),
            "workspace/executeCommand" => return self.handle_execute_command(id, params),
            _ => {
                self.send_response(&Response::err(
                    id,
                    METHOD_NOT_FOUND,
                    format!("mockls: method not found: {method}"),
                ));
                return None;
            }
        };

        self.send_response(&Response::ok(id, result));
        None
    }

    fn handle_notification(&mut self, method: &str, params: &Value) {
        match method {
            "initialized" => {
                if let Some(text) = &self.args.log_message {
                    send_message(
                        &self.writer,
                        &json!({
                            "jsonrpc": "2.0",
                            "method": "window/logMessage",
                            "params": { "type": 3, "message": text }
                        }),
                    );
                }
            }
            "textDocument/didOpen" => {
                if let Some(td) = params.get("textDocument") {
                    let uri = td.get("uri").and_then(Value::as_str).unwrap_or_default();
                    let text = td.get("text").and_then(Value::as_str).unwrap_or_default();
                    self.documents.insert(uri.to_string(), text.to_string());
                }
            }
            "textDocument/didChange" => {
                let uri = document_uri(params).unwrap_or_default();
                if let Some(text) = params
                    .get("contentChanges")
                    .and_then(Value::as_array)
                    .and_then(|arr| arr.last())
                    .and_then(|c| c.get("text"))
                    .and_then(Value::as_str)
                {
                    self.documents.insert(uri.to_string(), text.to_string());
                }
            }
            "textDocument/didSave" => {
                let uri = document_uri(params).unwrap_or_default();
                if let Some(text) = params.get("text").and_then(Value::as_str) {
                    self.documents.insert(uri.to_string(), text.to_string());
                }
            }
            "textDocument/didClose" => {
                if let Some(uri) = document_uri(params) {
                    self.documents.remove(uri);
                }
            }
            // exit and all others are silently accepted; the client closes the socket
            _ => {}
        }
    }

    fn handle_initialize() -> Value {
        json!({
            "capabilities": {
                "hoverProvider": true,
                "completionProvider": { "triggerCharacters": ["."] },
                "executeCommandProvider": {
                    "commands": ["echo", "sleep", "drop", "request"]
                },
                "textDocumentSync": {
                    "openClose": true,
                    "change": 1,
                    "save": { "includeText": true }
                }
            },
            "serverInfo": {
                "name": "mockls",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn handle_hover(&self, params: &Value) -> Value {
        let word = extract_position(params).and_then(|(uri, line, col)| {
            let content = self.documents.get(uri)?;
            extract_word(content, line, col)
        });

        word.map_or(Value::Null, |word| {
            json!({
                "contents": {
                    "kind": "markdown",
                    "value": format!("```\n{word}\n```")
                }
            })
        })
    }

    /// Every distinct word of the document, in order of first appearance.
    fn handle_completion(&self, params: &Value) -> Value {
        let Some(content) = document_uri(params).and_then(|uri| self.documents.get(uri)) else {
            return json!([]);
        };

        let mut seen = Vec::<&str>::new();
        for word in content
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
        {
            if !seen.contains(&word) {
                seen.push(word);
            }
        }

        let items: Vec<Value> = seen
            .into_iter()
            .map(|label| json!({ "label": label, "kind": 1 }))
            .collect();

        json!({ "isIncomplete": false, "items": items })
    }

    fn handle_execute_command(&mut self, id: Value, params: &Value) -> Option<Stop> {
        let command = params
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let first = params
            .get("arguments")
            .and_then(Value::as_array)
            .and_then(|args| args.first())
            .cloned()
            .unwrap_or(Value::Null);

        match command {
            "echo" => self.send_response(&Response::ok(id, first)),
            "sleep" => {
                let ms = first.get("ms").and_then(Value::as_u64).unwrap_or(0);
                let value = first.get("value").cloned().unwrap_or(Value::Null);
                let writer = self.writer.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(ms));
                    send_response(&writer, &Response::ok(id, value));
                });
            }
            "drop" => return Some(Stop::Dropped),
            "request" => {
                let req_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
                send_message(
                    &self.writer,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": req_id,
                        "method": "workspace/configuration",
                        "params": { "items": [{ "section": "mockls" }] }
                    }),
                );
                self.send_response(&Response::ok(id, Value::Null));
            }
            other => self.send_response(&Response::err(
                id,
                INVALID_PARAMS,
                format!("mockls: unknown command {other}"),
            )),
        }
        None
    }

    fn send_response(&self, response: &Response) {
        send_response(&self.writer, response);
    }
}

/// URI from a `{ textDocument: { uri } }` params object.
fn document_uri(params: &Value) -> Option<&str> {
    params
        .get("textDocument")
        .and_then(|td| td.get("uri"))
        .and_then(Value::as_str)
}

/// Extract `(uri, line, col)` from a `textDocument/position` params object.
fn extract_position(params: &Value) -> Option<(&str, usize, usize)> {
    let uri = document_uri(params)?;
    let position = params.get("position")?;
    let line = usize::try_from(position.get("line").and_then(Value::as_u64)?).ok()?;
    let col = usize::try_from(position.get("character").and_then(Value::as_u64)?).ok()?;
    Some((uri, line, col))
}

/// Write a Content-Length framed JSON string.
fn write_framed(writer: &Writer, json: &str) {
    let header = format!("Content-Length: {}\r\n\r\n", json.len());
    let Ok(mut w) = writer.lock() else { return };
    let _ = w.write_all(header.as_bytes());
    let _ = w.write_all(json.as_bytes());
    let _ = w.flush();
}

/// Send a JSON-RPC message to the client.
fn send_message(writer: &Writer, value: &Value) {
    let Ok(json) = serde_json::to_string(value) else {
        return;
    };
    write_framed(writer, &json);
}

fn send_response(writer: &Writer, response: &Response) {
    let Ok(json) = serde_json::to_string(response) else {
        return;
    };
    write_framed(writer, &json);
}

/// Parse a Content-Length framed message from a buffer.
/// Returns the message string and the number of bytes consumed.
fn try_parse_message(buffer: &[u8]) -> Option<(String, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buffer[..header_end]).ok()?;

    let mut content_length: Option<usize> = None;
    for line in headers.lines() {
        if line.to_ascii_lowercase().starts_with("content-length:") {
            content_length = line
                .split_once(':')
                .and_then(|(_, v)| v.trim().parse().ok());
        }
    }

    let content_length = content_length?;
    let total = header_end + 4 + content_length;

    if buffer.len() < total {
        return None;
    }

    let body = std::str::from_utf8(&buffer[header_end + 4..total]).ok()?;
    Some((body.to_string(), total))
}

/// Extract the word at a given line and column from content.
fn extract_word(content: &str, line: usize, col: usize) -> Option<String> {
    let line_text = content.lines().nth(line)?;

    if col >= line_text.len() {
        return None;
    }

    let bytes = line_text.as_bytes();

    let start = (0..=col)
        .rev()
        .find(|&i| !is_word_char(bytes[i]))
        .map_or(0, |i| i + 1);

    let end = (col..bytes.len())
        .find(|&i| !is_word_char(bytes[i]))
        .unwrap_or(bytes.len());

    if start >= end {
        return None;
    }

    Some(line_text[start..end].to_string())
}

const fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let listener = TcpListener::bind(&args.listen)?;

    println!("listening {}", listener.local_addr()?);
    std::io::stdout().flush()?;

    let (stream, _) = listener.accept()?;
    let writer = shared(stream.try_clone()?);
    let mut server = MockServer::new(args, writer, shared(std::io::stdout()));

    let mut reader = stream.try_clone()?;
    server.run(&mut reader);

    // Delayed replies may still hold a clone of the socket.
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Tests use expect/unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn default_args() -> Args {
        Args {
            listen: "127.0.0.1:0".to_string(),
            response_delay: 0,
            hang_on: vec![],
            fail_on: vec![],
            log_message: None,
        }
    }

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn extract_messages(data: &[u8]) -> Vec<Value> {
        let mut messages = Vec::new();
        let mut buf = data.to_vec();
        while let Some((msg, consumed)) = try_parse_message(&buf) {
            if let Ok(v) = serde_json::from_str::<Value>(&msg) {
                messages.push(v);
            }
            buf.drain(..consumed);
        }
        messages
    }

    struct Outcome {
        stop: Stop,
        messages: Vec<Value>,
        events: Vec<String>,
    }

    fn run_server_wait(args: Args, input: &[u8], wait_ms: u64) -> Outcome {
        let (writer, buf) = buffer_writer();
        let (events, log) = buffer_writer();
        let mut server = MockServer::new(args, writer, events);
        let mut reader = Cursor::new(input.to_vec());
        let stop = server.run(&mut reader);
        std::thread::sleep(Duration::from_millis(wait_ms));

        let messages = extract_messages(
            &buf.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let events = String::from_utf8_lossy(
            &log.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
        .lines()
        .map(str::to_string)
        .collect();

        Outcome {
            stop,
            messages,
            events,
        }
    }

    fn run_server_with(args: Args, input: &[u8]) -> Outcome {
        run_server_wait(args, input, 0)
    }

    fn request(id: u64, method: &str, params: &Value) -> Vec<u8> {
        frame(
            &json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params
            })
            .to_string(),
        )
    }

    fn notification(method: &str, params: &Value) -> Vec<u8> {
        frame(
            &json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params
            })
            .to_string(),
        )
    }

    fn initialize_request(id: u64) -> Vec<u8> {
        request(
            id,
            "initialize",
            &json!({ "processId": null, "capabilities": {}, "rootUri": null }),
        )
    }

    fn execute(id: u64, command: &str, argument: &Value) -> Vec<u8> {
        request(
            id,
            "workspace/executeCommand",
            &json!({ "command": command, "arguments": [argument] }),
        )
    }

    fn response_to(messages: &[Value], id: u64) -> &Value {
        messages
            .iter()
            .find(|m| m.get("id").and_then(Value::as_u64) == Some(id) && m.get("method").is_none())
            .expect("response with matching id")
    }

    #[test]
    fn test_initialize_reports_server_info() {
        let outcome = run_server_with(default_args(), &initialize_request(1));

        let resp = response_to(&outcome.messages, 1);
        assert!(resp["error"].is_null(), "Expected no error");
        assert_eq!(resp["result"]["serverInfo"]["name"], "mockls");
        let caps = &resp["result"]["capabilities"];
        assert_eq!(caps["hoverProvider"], true);
        assert!(caps["completionProvider"].is_object());
        assert_eq!(outcome.events, vec!["request initialize", "closed"]);
        assert_eq!(outcome.stop, Stop::Eof);
    }

    #[test]
    fn test_requests_before_initialize_are_rejected() {
        let input = execute(1, "echo", &json!(1));
        let outcome = run_server_with(default_args(), &input);

        let resp = response_to(&outcome.messages, 1);
        assert_eq!(resp["error"]["code"], SERVER_NOT_INITIALIZED);
    }

    #[test]
    fn test_echo_returns_first_argument() {
        let mut input = initialize_request(1);
        input.extend(execute(2, "echo", &json!({"x": 1})));

        let outcome = run_server_with(default_args(), &input);
        assert_eq!(response_to(&outcome.messages, 2)["result"], json!({"x": 1}));
    }

    #[test]
    fn test_sleep_replies_after_later_requests() {
        let mut input = initialize_request(1);
        input.extend(execute(2, "sleep", &json!({"ms": 50, "value": "slow"})));
        input.extend(execute(3, "echo", &json!("fast")));

        let outcome = run_server_wait(default_args(), &input, 200);
        let order: Vec<u64> = outcome
            .messages
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_u64))
            .collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(response_to(&outcome.messages, 2)["result"], "slow");
    }

    #[test]
    fn test_drop_stops_serving() {
        let mut input = initialize_request(1);
        input.extend(execute(2, "drop", &Value::Null));
        input.extend(execute(3, "echo", &json!(1)));

        let outcome = run_server_with(default_args(), &input);
        assert_eq!(outcome.stop, Stop::Dropped);
        assert_eq!(outcome.messages.len(), 1, "Only initialize is answered");
        assert_eq!(outcome.events.last().map(String::as_str), Some("closed"));
    }

    #[test]
    fn test_request_command_asks_the_client() {
        let mut input = initialize_request(1);
        input.extend(execute(2, "request", &Value::Null));
        input.extend(frame(
            &json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "nope" }
            })
            .to_string(),
        ));

        let outcome = run_server_with(default_args(), &input);
        let server_request = outcome
            .messages
            .iter()
            .find(|m| m["method"] == "workspace/configuration")
            .expect("server-initiated request");
        assert_eq!(server_request["id"], 1);
        assert!(outcome.events.contains(&"reply 1 error -32601".to_string()));
    }

    #[test]
    fn test_documents_feed_completion_and_hover() {
        let uri = "file:///tmp/test.txt";
        let mut input = initialize_request(1);
        input.extend(notification(
            "textDocument/didOpen",
            &json!({ "textDocument": { "uri": uri, "languageId": "text", "version": 0, "text": "alpha beta\nalpha" } }),
        ));
        input.extend(notification(
            "textDocument/didChange",
            &json!({
                "textDocument": { "uri": uri, "version": 1 },
                "contentChanges": [{ "text": "gamma delta" }]
            }),
        ));
        input.extend(request(
            2,
            "textDocument/completion",
            &json!({ "textDocument": { "uri": uri }, "position": { "line": 0, "character": 0 } }),
        ));
        input.extend(request(
            3,
            "textDocument/hover",
            &json!({ "textDocument": { "uri": uri }, "position": { "line": 0, "character": 8 } }),
        ));

        let outcome = run_server_with(default_args(), &input);

        let items = response_to(&outcome.messages, 2)["result"]["items"]
            .as_array()
            .expect("completion list");
        let labels: Vec<&str> = items.iter().filter_map(|i| i["label"].as_str()).collect();
        assert_eq!(labels, vec!["gamma", "delta"]);

        let hover = &response_to(&outcome.messages, 3)["result"];
        assert!(hover["contents"]["value"]
            .as_str()
            .unwrap_or("")
            .contains("delta"));
    }

    #[test]
    fn test_fail_and_hang_flags() {
        let mut args = default_args();
        args.fail_on = vec!["textDocument/hover".to_string()];
        args.hang_on = vec!["shutdown".to_string()];

        let mut input = initialize_request(1);
        input.extend(request(
            2,
            "textDocument/hover",
            &json!({ "textDocument": { "uri": "file:///x" }, "position": { "line": 0, "character": 0 } }),
        ));
        input.extend(request(3, "shutdown", &Value::Null));

        let outcome = run_server_with(args, &input);
        assert_eq!(response_to(&outcome.messages, 2)["error"]["code"], INTERNAL_ERROR);
        assert!(
            !outcome.messages.iter().any(|m| m["id"] == 3),
            "shutdown must not be answered"
        );
    }

    #[test]
    fn test_log_message_after_initialized() {
        let mut args = default_args();
        args.log_message = Some("indexing done".to_string());

        let mut input = initialize_request(1);
        input.extend(notification("initialized", &json!({})));

        let outcome = run_server_with(args, &input);
        let log = outcome
            .messages
            .iter()
            .find(|m| m["method"] == "window/logMessage")
            .expect("logMessage notification");
        assert_eq!(log["params"]["message"], "indexing done");
        assert_eq!(log["params"]["type"], 3);
    }

    #[test]
    fn test_request_id_echo() {
        let shutdown = json!({
            "jsonrpc": "2.0",
            "id": "string-id",
            "method": "shutdown",
            "params": null
        })
        .to_string();

        let mut input = request(42, "initialize", &json!({ "capabilities": {} }));
        input.extend(frame(&shutdown));

        let outcome = run_server_with(default_args(), &input);

        assert_eq!(outcome.messages[0]["id"], 42, "Init should echo numeric id");
        assert!(
            outcome
                .messages
                .iter()
                .any(|m| m.get("id").and_then(Value::as_str) == Some("string-id")),
            "Shutdown should echo string id"
        );
    }
}
