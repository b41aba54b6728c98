// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipper lifecycle and the background delivery worker.
//!
//! ```text
//!   application ──enqueue──> DeliveryQueue ──pop──> DeliveryWorker ──send──> Graylog
//!        │                        ^
//!        └──── start / stop ──────┘ (shutdown entry)
//! ```
//!
//! The worker is a single tokio task and delivers strictly one record at a time. It does
//! not keep the runtime alive: an application that never calls [`LogShipper::stop`] simply
//! abandons whatever is still queued when it exits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::config::ShipperConfig;
use crate::error::ShipperError;
use crate::queue::{DeliveryQueue, Entry};
use crate::sender::{DeliveryOutcome, Sender, TcpTransport, Transport};
use crate::Record;

/// Status of the delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipperStatus {
    /// The worker is delivering records.
    Running,
    /// A stop was requested and the worker has not exited yet.
    Stopping,
    /// No worker is running. Records enqueued now wait for the next start.
    Stopped,
}

enum WorkerState {
    Stopped,
    Running(JoinHandle<()>),
    Stopping,
}

/// Queues log records and ships each one to Graylog on its own TCP connection.
///
/// # Example
///
/// ```no_run
/// use graylog_shipper::{LogShipper, Record, ShipperConfig, ShipperError};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), ShipperError> {
///     let shipper = LogShipper::new(ShipperConfig::new("graylog.internal", 12201));
///     shipper.start()?;
///
///     let mut record = Record::new();
///     record.insert("short_message".to_string(), json!("service started"));
///     shipper.enqueue([record]);
///
///     shipper.stop(true).await
/// }
/// ```
pub struct LogShipper {
    config: ShipperConfig,
    queue: Arc<DeliveryQueue>,
    sender: Sender,
    worker: Mutex<WorkerState>,
}

impl LogShipper {
    /// Creates a stopped shipper delivering over TCP to the configured endpoint.
    pub fn new(config: ShipperConfig) -> Self {
        let transport = Arc::new(TcpTransport::new(config.host.clone(), config.port));
        Self::with_transport(config, transport)
    }

    /// Creates a stopped shipper delivering through `transport`.
    pub fn with_transport(config: ShipperConfig, transport: Arc<dyn Transport>) -> Self {
        let queue = Arc::new(DeliveryQueue::new(config.max_queue_len));
        let sender = Sender::new(transport, config.normalize);
        Self {
            config,
            queue,
            sender,
            worker: Mutex::new(WorkerState::Stopped),
        }
    }

    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    fn lock_worker(&self) -> MutexGuard<'_, WorkerState> {
        #[allow(clippy::expect_used)]
        self.worker.lock().expect("lock poisoned")
    }

    /// Spawns the delivery worker on the current tokio runtime and returns immediately.
    ///
    /// # Errors
    ///
    /// - [`ShipperError::NoRuntime`] when called outside a tokio runtime
    /// - [`ShipperError::AlreadyStarted`] when a worker is running or still stopping
    pub fn start(&self) -> Result<(), ShipperError> {
        let runtime = Handle::try_current().map_err(|_| ShipperError::NoRuntime)?;

        let mut state = self.lock_worker();
        match &*state {
            WorkerState::Running(handle) if !handle.is_finished() => {
                return Err(ShipperError::AlreadyStarted)
            }
            WorkerState::Stopping => return Err(ShipperError::AlreadyStarted),
            _ => {}
        }

        // Left behind by a worker that died before consuming it.
        self.queue.clear_shutdown();

        let worker = DeliveryWorker {
            queue: Arc::clone(&self.queue),
            sender: self.sender.clone(),
        };
        *state = WorkerState::Running(runtime.spawn(worker.run()));

        info!("Shipping logs to {}", self.config.endpoint());
        Ok(())
    }

    /// Asks the worker to exit and waits until it has.
    ///
    /// A graceful stop delivers every record enqueued before this call first. A forceful
    /// stop only lets the record currently in flight finish; the rest stay queued and are
    /// delivered if the shipper is started again. Stopping a shipper that is not running
    /// does nothing. Dropping the returned future before it completes leaves the shipper
    /// `Running` with the shutdown request in place; calling `stop` again waits for it.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Worker`] if the worker task panicked.
    pub async fn stop(&self, graceful: bool) -> Result<(), ShipperError> {
        let handle = {
            let mut state = self.lock_worker();
            match std::mem::replace(&mut *state, WorkerState::Stopping) {
                WorkerState::Running(handle) => handle,
                previous => {
                    *state = previous;
                    debug!("Shipper is not running, nothing to stop");
                    return Ok(());
                }
            }
        };

        // A worker that already died has nobody left to consume the shutdown entry.
        if !handle.is_finished() {
            self.queue.push_shutdown(graceful);
        }

        let result = PendingStop {
            worker: &self.worker,
            handle: Some(handle),
        }
        .wait()
        .await;
        *self.lock_worker() = WorkerState::Stopped;

        match result {
            Ok(()) => {
                info!(
                    "Stopped shipping logs, {} records left in queue",
                    self.queue.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("Delivery worker exited abnormally: {e}");
                Err(ShipperError::Worker(e.to_string()))
            }
        }
    }

    /// Queues records for delivery in iteration order. Never blocks.
    pub fn enqueue<I>(&self, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        self.queue.push_records(records);
    }

    pub fn status(&self) -> ShipperStatus {
        match &*self.lock_worker() {
            WorkerState::Running(handle) if !handle.is_finished() => ShipperStatus::Running,
            WorkerState::Running(_) | WorkerState::Stopped => ShipperStatus::Stopped,
            WorkerState::Stopping => ShipperStatus::Stopping,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == ShipperStatus::Running
    }

    /// Records waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Records evicted because the queue bound was reached.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

/// Worker handle owned by an in-progress [`LogShipper::stop`].
///
/// If the stop future is dropped before the worker exits, the handle goes back into the
/// shipper as `Running` so a later `stop` can wait for it again. The shutdown entry stays
/// queued and the worker still exits on it.
struct PendingStop<'a> {
    worker: &'a Mutex<WorkerState>,
    handle: Option<JoinHandle<()>>,
}

impl PendingStop<'_> {
    async fn wait(mut self) -> Result<(), JoinError> {
        let result = match self.handle.as_mut() {
            Some(handle) => handle.await,
            None => Ok(()),
        };
        self.handle = None;
        result
    }
}

impl Drop for PendingStop<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Stop cancelled before the delivery worker exited");
            *self.worker.lock().unwrap_or_else(PoisonError::into_inner) =
                WorkerState::Running(handle);
        }
    }
}

/// Sole consumer of the delivery queue.
struct DeliveryWorker {
    queue: Arc<DeliveryQueue>,
    sender: Sender,
}

impl DeliveryWorker {
    async fn run(self) {
        debug!("Delivery worker started");

        loop {
            match self.queue.pop().await {
                Entry::Shutdown => {
                    debug!("Delivery worker shutting down");
                    break;
                }
                Entry::Record(record) => match self.sender.send(record).await {
                    Ok(DeliveryOutcome::Sent { .. }) | Ok(DeliveryOutcome::Skipped) => {}
                    Err(e) => error!("Dropping record: {e}"),
                },
            }
        }

        debug!("Delivery worker stopped");
    }
}
