// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Byte-stream transport: dialing an endpoint and moving framed messages.
//!
//! The correlation engine only sees [`MessageReader`] and [`MessageWriter`],
//! which work over any `AsyncRead`/`AsyncWrite` pair. [`Endpoint::connect`]
//! produces them from a TCP or Unix socket.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::protocol;
use crate::error::SessionError;

/// Boxed read half of a connection.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of a connection.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Kind of socket to dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// TCP, address is `host:port`.
    #[default]
    Tcp,
    /// Unix domain socket, address is a filesystem path.
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        })
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            other => Err(format!("unknown network kind '{other}', expected tcp or unix")),
        }
    }
}

/// Where the language server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Socket kind.
    #[serde(default)]
    pub network: Network,
    /// Address in the form expected by `network`.
    pub address: String,
}

impl Endpoint {
    /// A TCP endpoint.
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            network: Network::Tcp,
            address: address.into(),
        }
    }

    /// A Unix socket endpoint.
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            network: Network::Unix,
            address: path.into(),
        }
    }

    /// Dials the endpoint and splits the stream into framed halves.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Dial`] if the connection cannot be established.
    pub async fn connect(&self) -> Result<(MessageReader, MessageWriter), SessionError> {
        debug!("Dialing {} endpoint {}", self.network, self.address);

        let halves = match self.network {
            Network::Tcp => tokio::net::TcpStream::connect(&self.address)
                .await
                .map(|stream| {
                    let (r, w) = stream.into_split();
                    (Box::new(r) as BoxReader, Box::new(w) as BoxWriter)
                }),
            Network::Unix => connect_unix(&self.address).await,
        };

        let (reader, writer) = halves.map_err(|source| SessionError::Dial {
            network: self.network.to_string(),
            address: self.address.clone(),
            source,
        })?;

        Ok((MessageReader::new(reader), MessageWriter::new(writer)))
    }
}

#[cfg(unix)]
async fn connect_unix(path: &str) -> io::Result<(BoxReader, BoxWriter)> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    let (r, w) = stream.into_split();
    Ok((Box::new(r), Box::new(w)))
}

#[cfg(not(unix))]
async fn connect_unix(_path: &str) -> io::Result<(BoxReader, BoxWriter)> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}

/// Read half: yields one message body at a time.
pub struct MessageReader {
    inner: BoxReader,
    buffer: BytesMut,
}

impl MessageReader {
    /// Wraps a raw read half.
    pub fn new(inner: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Waits for the next complete message body. `Ok(None)` means a clean EOF.
    ///
    /// The body is not decoded here, see [`Message::parse`](protocol::Message::parse).
    /// Cancel safe: bytes already read stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error on socket failure, on malformed framing, or when the
    /// stream ends in the middle of a message.
    pub async fn receive(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(body) = protocol::try_parse_message(&mut self.buffer)? {
                trace!("Received message: {}", String::from_utf8_lossy(&body));
                return Ok(Some(body));
            }

            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed with {} unparsed bytes", self.buffer.len()),
                ));
            }
        }
    }
}

/// Write half: frames and flushes one message per call.
pub struct MessageWriter {
    inner: BoxWriter,
    /// Set while a frame is being written. Still set on entry means the
    /// previous send was dropped or failed part way through a frame.
    torn: bool,
}

impl MessageWriter {
    /// Wraps a raw write half.
    pub fn new(inner: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            torn: false,
        }
    }

    /// Serializes, frames and flushes `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let body = serde_json::to_vec(message)?;
        trace!("Sending message: {}", String::from_utf8_lossy(&body));
        self.send_raw(&body).await
    }

    /// Frames and flushes an already serialized body.
    ///
    /// Dropping the future mid-write leaves a partial frame on the wire; every
    /// later send then fails with `BrokenPipe` instead of corrupting the stream
    /// further.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or an earlier frame was torn.
    pub async fn send_raw(&mut self, body: &[u8]) -> io::Result<()> {
        if self.torn {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "an earlier message was only partly written",
            ));
        }

        self.torn = true;
        self.inner.write_all(&protocol::frame(body)).await?;
        self.inner.flush().await?;
        self.torn = false;
        Ok(())
    }

    /// Closes the write direction of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying shutdown fails.
    pub async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
