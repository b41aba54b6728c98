// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory transport for tests. Enabled with the `test-utils` feature.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::sender::{Connection, Transport};

/// Something a [`RecordingTransport`] observed, tagged with the connection id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open(usize),
    Write(usize, Vec<u8>),
    Close(usize),
}

/// Transport that records every open, write and close instead of touching the network.
///
/// Clones share the same event log, so a test keeps one clone and hands another to the
/// shipper.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    events: Arc<Mutex<Vec<TransportEvent>>>,
    next_id: Arc<AtomicUsize>,
    connect_failures: Arc<AtomicUsize>,
    write_failures: Arc<AtomicUsize>,
    connect_gate: Option<Arc<Semaphore>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` connection attempts.
    #[must_use]
    pub fn failing_connects(self, n: usize) -> Self {
        self.connect_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` writes. The connections are still opened and closed.
    #[must_use]
    pub fn failing_writes(self, n: usize) -> Self {
        self.write_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Hold every connection attempt until [`RecordingTransport::release_connects`] lets
    /// it through.
    #[must_use]
    pub fn with_connect_gate(mut self) -> Self {
        self.connect_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held connection attempts proceed. No-op without a gate.
    pub fn release_connects(&self, n: usize) {
        if let Some(gate) = &self.connect_gate {
            gate.add_permits(n);
        }
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        #[allow(clippy::expect_used)]
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Payloads that were written, in order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Write(_, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Written payloads decoded back into JSON values.
    pub fn records(&self) -> Vec<Value> {
        self.payloads()
            .iter()
            .filter_map(|payload| serde_json::from_slice(payload).ok())
            .collect()
    }

    fn record(&self, event: TransportEvent) {
        #[allow(clippy::expect_used)]
        self.events.lock().expect("lock poisoned").push(event);
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Transport for RecordingTransport {
    fn endpoint(&self) -> String {
        "recording".to_string()
    }

    async fn connect(&self) -> io::Result<Box<dyn Connection>> {
        if let Some(gate) = &self.connect_gate {
            gate.acquire()
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                .forget();
        }
        if take_failure(&self.connect_failures) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(TransportEvent::Open(id));
        Ok(Box::new(RecordingConnection {
            id,
            transport: self.clone(),
        }))
    }
}

struct RecordingConnection {
    id: usize,
    transport: RecordingTransport,
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn write_all(&mut self, payload: &[u8]) -> io::Result<()> {
        if take_failure(&self.transport.write_failures) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.transport
            .record(TransportEvent::Write(self.id, payload.to_vec()));
        Ok(())
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        self.transport.record(TransportEvent::Close(self.id));
        Ok(())
    }
}
