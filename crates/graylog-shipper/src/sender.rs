// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-connection-per-record delivery.
//!
//! A Graylog raw TCP input frames messages by connection: every byte received until the
//! peer closes is one message. Sharing a connection between records would merge them, so
//! [`Sender::send`] opens a fresh connection for each record, writes the whole payload and
//! closes it again whatever the outcome of the write.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::SendError;
use crate::normalizer::normalize;
use crate::Record;

/// Establishes connections to the log endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable endpoint, used in errors and logs.
    fn endpoint(&self) -> String;

    async fn connect(&self) -> io::Result<Box<dyn Connection>>;
}

/// A single established connection. Owned by one `send` call and never shared.
#[async_trait]
pub trait Connection: Send {
    async fn write_all(&mut self, payload: &[u8]) -> io::Result<()>;

    async fn close(self: Box<Self>) -> io::Result<()>;
}

/// Plain TCP transport to a Graylog input.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> io::Result<Box<dyn Connection>> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        Ok(Box::new(TcpConnection { stream }))
    }
}

struct TcpConnection {
    stream: TcpStream,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn write_all(&mut self, payload: &[u8]) -> io::Result<()> {
        self.stream.write_all(payload).await
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        let mut stream = self.stream;
        stream.shutdown().await
    }
}

/// What happened to a record handed to [`Sender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The payload was written and the connection closed.
    Sent { bytes: usize },
    /// Encoding produced nothing to send; no connection was opened.
    Skipped,
}

/// Normalizes, encodes and pushes records, one connection each.
#[derive(Clone)]
pub struct Sender {
    transport: Arc<dyn Transport>,
    normalize: bool,
}

impl Sender {
    pub fn new(transport: Arc<dyn Transport>, normalize: bool) -> Self {
        Self {
            transport,
            normalize,
        }
    }

    /// Delivers a single record.
    ///
    /// # Errors
    ///
    /// - [`SendError::Encode`] if the record cannot be serialized
    /// - [`SendError::Connect`] if no connection could be established
    /// - [`SendError::Write`] if the write failed; the connection has been closed already
    pub async fn send(&self, record: Record) -> Result<DeliveryOutcome, SendError> {
        let record = if self.normalize {
            normalize(record)
        } else {
            record
        };

        let payload = encode(record)?;
        if payload.is_empty() {
            debug!("Encoded record is empty, nothing to send");
            return Ok(DeliveryOutcome::Skipped);
        }

        let mut connection =
            self.transport
                .connect()
                .await
                .map_err(|source| SendError::Connect {
                    endpoint: self.transport.endpoint(),
                    source,
                })?;

        let written = connection.write_all(&payload).await;
        // Close regardless of the write outcome; the receiver frames on close.
        if let Err(e) = connection.close().await {
            debug!("Error closing connection to {}: {e}", self.transport.endpoint());
        }

        written.map_err(|source| SendError::Write {
            bytes: payload.len(),
            source,
        })?;

        trace!(
            "Sent {} bytes to {}",
            payload.len(),
            self.transport.endpoint()
        );
        Ok(DeliveryOutcome::Sent {
            bytes: payload.len(),
        })
    }
}

/// UTF-8 JSON text of the record.
pub(crate) fn encode(record: Record) -> Result<Vec<u8>, SendError> {
    Ok(serde_json::to_vec(&Value::Object(record))?)
}
