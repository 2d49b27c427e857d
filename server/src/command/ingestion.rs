//! FIFO for endpoint data that is not a reply to any pending command
//!
//! Fed by the reply router (unmatched messages) and by the out-of-band
//! ingress. Consumed by dispatches whose answer arrives as a separate report.
//!
//! The queue is bounded: pushing onto a full queue evicts the oldest item,
//! so stale data never blocks fresh reports.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

struct Queued {
    queued_at: Instant,
    item: Value,
}

/// Bounded FIFO of unsolicited payloads
pub struct IngestionQueue {
    items: Mutex<VecDeque<Queued>>,
    arrived: Notify,
    capacity: usize,
    evicted: AtomicU64,
}

impl IngestionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            arrived: Notify::new(),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Enqueue an item without waiting. Returns the oldest item if it had to
    /// be evicted to make room.
    pub fn push(&self, item: Value) -> Option<Value> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front().map(|q| q.item)
            } else {
                None
            };
            items.push_back(Queued {
                queued_at: Instant::now(),
                item,
            });
            evicted
        };
        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.arrived.notify_waiters();
        evicted
    }

    /// Dequeue the oldest item, or None once `timeout` elapses
    pub async fn pop(&self, timeout: Duration) -> Option<Value> {
        self.pop_until(Instant::now() + timeout).await
    }

    /// Dequeue the oldest item, or None once `deadline` passes
    pub async fn pop_until(&self, deadline: Instant) -> Option<Value> {
        self.pop_matching(None, deadline, |_| true).await
    }

    /// Dequeue the oldest item accepted by `matches`, or None once `deadline`
    /// passes. With `since`, items queued before that instant are passed over.
    ///
    /// Items passed over stay queued for other consumers.
    pub async fn pop_matching<F>(
        &self,
        since: Option<Instant>,
        deadline: Instant,
        matches: F,
    ) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        loop {
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            // Register before scanning so a push in between still wakes us
            arrived.as_mut().enable();

            if let Some(item) = self.take_first(since, &matches) {
                return Some(item);
            }
            if timeout_at(deadline, arrived).await.is_err() {
                return None;
            }
        }
    }

    fn take_first<F>(&self, since: Option<Instant>, matches: &F) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        let mut items = self.items.lock();
        let index = items.iter().position(|q| {
            since.map_or(true, |since| q.queued_at >= since) && matches(&q.item)
        })?;
        items.remove(index).map(|q| q.item)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items dropped to make room since startup
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}
