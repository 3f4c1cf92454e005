// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! JSON-RPC 2.0 envelopes and `Content-Length` framing.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Protocol version string carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for a method the receiver does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Largest body accepted from a peer. Anything bigger breaks the connection.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

fn default_null() -> serde_json::Value {
    serde_json::Value::Null
}

/// Request identifier. Outbound ids are always numeric; peers may use strings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id, as allocated by the correlation engine.
    Number(u64),
    /// String id, only ever seen on peer-originated requests.
    String(String),
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A call that expects a reply.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestMessage {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Parameters, `null` when absent.
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

/// A one-way message.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationMessage {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Parameters, `null` when absent.
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

/// The reply to a [`RequestMessage`]. Carries `result` xor `error`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseMessage {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request being answered. `null` only for parse errors.
    pub id: Option<RequestId>,
    /// Success payload. A JSON `null` result deserializes to `None`;
    /// [`Message::parse`] rejects responses with neither field present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

/// Error object of a failed response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RequestMessage {
    /// Builds a request envelope.
    pub fn new(id: RequestId, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl NotificationMessage {
    /// Builds a notification envelope.
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

impl ResponseMessage {
    /// Builds an error reply, used to turn down peer requests we do not serve.
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: None,
            error: Some(ResponseError {
                code: METHOD_NOT_FOUND,
                message: format!("Method '{method}' not supported by client"),
                data: None,
            }),
        }
    }
}

/// Any inbound envelope, classified by which fields are present.
#[derive(Debug, Clone)]
pub enum Message {
    /// Has both `id` and `method`.
    Request(RequestMessage),
    /// Has `method` but no `id`.
    Notification(NotificationMessage),
    /// Has `id` but no `method`.
    Response(ResponseMessage),
}

impl Message {
    /// Parses and classifies one message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not UTF-8 JSON, or if it matches none
    /// of the three envelope shapes. A response must carry exactly one of
    /// `result` and `error`; a `null` result counts as present.
    pub fn parse(body: impl AsRef<[u8]>) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(body.as_ref())?;

        let has_id = value.get("id").is_some();
        match value.get("method") {
            Some(serde_json::Value::String(_)) if has_id => {
                return serde_json::from_value(value).map(Self::Request);
            }
            Some(serde_json::Value::String(_)) => {
                return serde_json::from_value(value).map(Self::Notification);
            }
            Some(other) => return Err(malformed(format!("method is not a string: {other}"))),
            None => {}
        }

        let has_result = value.get("result").is_some();
        let has_error = value.get("error").is_some();
        match (has_result, has_error) {
            (true, false) | (false, true) => serde_json::from_value(value).map(Self::Response),
            (true, true) => Err(malformed("response carries both result and error")),
            (false, false) => Err(malformed("response carries neither result nor error")),
        }
    }
}

fn malformed(msg: impl fmt::Display) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(msg)
}

/// Frames a serialized body with its `Content-Length` header.
#[must_use]
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(body);
    framed
}

/// Pops one complete message body off the front of `buffer`, if present.
///
/// Returns `Ok(None)` while the header or body is still incomplete. The body
/// is returned as raw bytes; decoding it is left to [`Message::parse`] so a
/// bad body costs one message, not the connection.
///
/// # Errors
///
/// Returns `InvalidData` if the header block is not UTF-8, or carries an
/// unparsable, missing or oversized `Content-Length`.
pub fn try_parse_message(buffer: &mut BytesMut) -> io::Result<Option<Bytes>> {
    let Some(split) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };

    let headers = std::str::from_utf8(&buffer[..split])
        .map_err(|e| invalid_data(format!("header is not UTF-8: {e}")))?;

    let mut content_length = None;
    for line in headers.lines() {
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid_data(format!("bad Content-Length {value:?}: {e}")))?;
            content_length = Some(len);
        }
    }

    let content_length =
        content_length.ok_or_else(|| invalid_data("missing Content-Length header"))?;
    if content_length > MAX_CONTENT_LENGTH {
        return Err(invalid_data(format!(
            "Content-Length {content_length} exceeds the {MAX_CONTENT_LENGTH} byte limit"
        )));
    }

    let header_len = split + 4;
    if buffer.len() < header_len + content_length {
        return Ok(None);
    }

    buffer.advance(header_len);
    Ok(Some(buffer.split_to(content_length).freeze()))
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
