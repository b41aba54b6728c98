// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! FIFO of pending records shared between producers and the delivery worker.
//!
//! Shutdown travels through the queue as an [`Entry::Shutdown`] so it is ordered with the
//! data: appended at the tail it drains everything queued before it, pushed at the head it
//! overtakes everything still waiting.
//!
//! ```text
//!   enqueue ──> [ r1 | r2 | r3 | Shutdown ] ──> pop (worker)     graceful
//!               [ Shutdown | r1 | r2 | r3 ] ──> pop (worker)     forceful
//! ```
//!
//! Pushing never blocks. The worker suspends in [`DeliveryQueue::pop`] while the queue is
//! empty and is woken by the next push.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::warn;

use crate::Record;

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Record(Record),
    Shutdown,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<Entry>,
    records: usize,
    dropped: u64,
}

#[derive(Debug)]
pub struct DeliveryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    max_records: Option<usize>,
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DeliveryQueue {
    /// Creates a queue. With `max_records` set, pushing onto a full queue evicts the
    /// oldest pending record.
    pub fn new(max_records: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            max_records,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        #[allow(clippy::expect_used)]
        self.inner.lock().expect("lock poisoned")
    }

    /// Appends records to the tail, preserving their order.
    pub fn push_records<I>(&self, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        let mut pushed = false;
        let mut evicted = 0;
        {
            let mut inner = self.lock();
            for record in records {
                if let Some(max) = self.max_records {
                    if inner.records >= max && evict_oldest_record(&mut inner) {
                        evicted += 1;
                    }
                }
                inner.entries.push_back(Entry::Record(record));
                inner.records += 1;
                pushed = true;
            }
            inner.dropped += evicted;
        }

        if evicted > 0 {
            warn!("Delivery queue full, dropped {evicted} oldest records");
        }
        if pushed {
            self.notify.notify_one();
        }
    }

    /// Queues the shutdown marker: at the tail when `graceful`, otherwise at the head.
    ///
    /// At most one marker is queued; a new request replaces the previous one.
    pub fn push_shutdown(&self, graceful: bool) {
        {
            let mut inner = self.lock();
            inner.entries.retain(|entry| !matches!(entry, Entry::Shutdown));
            if graceful {
                inner.entries.push_back(Entry::Shutdown);
            } else {
                inner.entries.push_front(Entry::Shutdown);
            }
        }
        self.notify.notify_one();
    }

    /// Removes the head entry, waiting while the queue is empty.
    pub async fn pop(&self) -> Entry {
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.try_pop() {
                return entry;
            }
            notified.await;
        }
    }

    /// Removes a shutdown marker nobody consumed, e.g. after the worker died.
    pub fn clear_shutdown(&self) {
        self.lock()
            .entries
            .retain(|entry| !matches!(entry, Entry::Shutdown));
    }

    pub fn try_pop(&self) -> Option<Entry> {
        let mut inner = self.lock();
        let entry = inner.entries.pop_front()?;
        if matches!(entry, Entry::Record(_)) {
            inner.records -= 1;
        }
        Some(entry)
    }

    /// Number of records waiting to be delivered.
    pub fn len(&self) -> usize {
        self.lock().records
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total records evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

// Shutdown entries are never evicted.
fn evict_oldest_record(inner: &mut Inner) -> bool {
    let Some(position) = inner
        .entries
        .iter()
        .position(|entry| matches!(entry, Entry::Record(_)))
    else {
        return false;
    };
    inner.entries.remove(position);
    inner.records -= 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(seq: i64) -> Record {
        let mut map = Record::new();
        map.insert("seq".to_string(), json!(seq));
        map
    }

    fn drain(queue: &DeliveryQueue) -> Vec<Entry> {
        std::iter::from_fn(|| queue.try_pop()).collect()
    }

    #[test]
    fn test_records_are_fifo() {
        let queue = DeliveryQueue::default();
        queue.push_records(vec![record(1), record(2)]);
        queue.push_records(vec![record(3)]);

        assert_eq!(queue.len(), 3);
        assert_eq!(
            drain(&queue),
            vec![
                Entry::Record(record(1)),
                Entry::Record(record(2)),
                Entry::Record(record(3)),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_push_is_noop() {
        let queue = DeliveryQueue::default();
        queue.push_records(Vec::new());
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_graceful_shutdown_goes_to_tail() {
        let queue = DeliveryQueue::default();
        queue.push_records(vec![record(1), record(2)]);
        queue.push_shutdown(true);

        assert_eq!(
            drain(&queue),
            vec![
                Entry::Record(record(1)),
                Entry::Record(record(2)),
                Entry::Shutdown,
            ]
        );
    }

    #[test]
    fn test_forceful_shutdown_goes_to_head() {
        let queue = DeliveryQueue::default();
        queue.push_records(vec![record(1), record(2)]);
        queue.push_shutdown(false);

        assert_eq!(queue.try_pop(), Some(Entry::Shutdown));
        // Abandoned records stay queued.
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_shutdown_request_replaces_previous_one() {
        let queue = DeliveryQueue::default();
        queue.push_records(vec![record(1), record(2)]);
        queue.push_shutdown(true);
        queue.push_shutdown(false);

        assert_eq!(
            drain(&queue),
            vec![
                Entry::Shutdown,
                Entry::Record(record(1)),
                Entry::Record(record(2)),
            ]
        );

        queue.push_records(vec![record(3)]);
        queue.push_shutdown(false);
        queue.push_shutdown(true);
        assert_eq!(
            drain(&queue),
            vec![Entry::Record(record(3)), Entry::Shutdown]
        );
    }

    #[test]
    fn test_clear_shutdown_keeps_records() {
        let queue = DeliveryQueue::default();
        queue.push_records(vec![record(1)]);
        queue.push_shutdown(false);
        queue.clear_shutdown();

        assert_eq!(drain(&queue), vec![Entry::Record(record(1))]);
    }

    #[test]
    fn test_bounded_queue_drops_oldest() {
        let queue = DeliveryQueue::new(Some(2));
        queue.push_records(vec![record(1), record(2), record(3)]);
        queue.push_records(vec![record(4)]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(
            drain(&queue),
            vec![Entry::Record(record(3)), Entry::Record(record(4))]
        );
    }

    #[test]
    fn test_bounded_queue_never_evicts_shutdown() {
        let queue = DeliveryQueue::new(Some(1));
        queue.push_records(vec![record(1)]);
        queue.push_shutdown(false);
        queue.push_records(vec![record(2)]);

        assert_eq!(queue.dropped(), 1);
        assert_eq!(
            drain(&queue),
            vec![Entry::Shutdown, Entry::Record(record(2))]
        );
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(DeliveryQueue::default());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.push_records(vec![record(7)]);
        let entry = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should wake up")
            .expect("consumer task failed");
        assert_eq!(entry, Entry::Record(record(7)));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_shutdown() {
        let queue = Arc::new(DeliveryQueue::default());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        queue.push_shutdown(true);
        let entry = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should wake up")
            .expect("consumer task failed");
        assert_eq!(entry, Entry::Shutdown);
    }
}
