//! Pending request table: correlation id → one-shot reply slot
//!
//! Flow:
//! 1. The dispatcher calls `open()` to mint an id and get a [`PendingSlot`]
//! 2. The command goes out carrying that id
//! 3. The reply router calls `resolve()` when a reply with the id arrives
//! 4. On deadline the dispatcher calls `abandon()`; a later reply resolves nothing
//!
//! Removal of a key is atomic, so `resolve` and `abandon` racing on the
//! deadline boundary take effect at most once between them.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use devlink_shared::{CorrelationId, FunctionName};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct PendingEntry {
    sender: oneshot::Sender<Value>,
    device_id: String,
    function: FunctionName,
    created_at: Instant,
}

/// One-shot placeholder owned by the dispatch call that created it
#[derive(Debug)]
pub struct PendingSlot {
    correlation_id: CorrelationId,
    receiver: oneshot::Receiver<Value>,
}

impl PendingSlot {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Wait for the payload; None if the slot was removed without one
    pub async fn recv(&mut self) -> Option<Value> {
        (&mut self.receiver).await.ok()
    }
}

/// Counters for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    pub created: AtomicU64,
    pub resolved: AtomicU64,
    pub abandoned: AtomicU64,
    /// Replies whose id was unknown, late, or already settled
    pub unresolved_drops: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingStatsSnapshot {
    pub created: u64,
    pub resolved: u64,
    pub abandoned: u64,
    pub unresolved_drops: u64,
}

impl PendingStats {
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            unresolved_drops: self.unresolved_drops.load(Ordering::Relaxed),
        }
    }
}

/// Single source of truth for in-flight requests
pub struct PendingRequestTable {
    pending: DashMap<CorrelationId, PendingEntry>,
    stats: PendingStats,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: PendingStats::default(),
        }
    }

    /// Insert a fresh unresolved slot. Returns None if the id is already pending.
    pub fn create(
        &self,
        correlation_id: CorrelationId,
        device_id: &str,
        function: FunctionName,
    ) -> Option<PendingSlot> {
        match self.pending.entry(correlation_id) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %correlation_id, "Correlation id already pending");
                None
            }
            Entry::Vacant(vacant) => {
                let (sender, receiver) = oneshot::channel();
                vacant.insert(PendingEntry {
                    sender,
                    device_id: device_id.to_string(),
                    function,
                    created_at: Instant::now(),
                });
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    device_id,
                    function = %function,
                    "Registered pending request"
                );
                Some(PendingSlot {
                    correlation_id,
                    receiver,
                })
            }
        }
    }

    /// Mint a correlation id and create its slot
    pub fn open(&self, device_id: &str, function: FunctionName) -> PendingSlot {
        loop {
            if let Some(slot) = self.create(CorrelationId::new(), device_id, function) {
                return slot;
            }
        }
    }

    /// Deliver a payload to the slot for `correlation_id`.
    ///
    /// Returns false, discarding the payload, if no live slot exists.
    pub fn resolve(&self, correlation_id: CorrelationId, payload: Value) -> bool {
        let Some((_, entry)) = self.pending.remove(&correlation_id) else {
            self.stats.unresolved_drops.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                "Reply for unknown or expired correlation id"
            );
            return false;
        };

        let waited = entry.created_at.elapsed();
        match entry.sender.send(payload) {
            Ok(()) => {
                self.stats.resolved.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    device_id = %entry.device_id,
                    function = %entry.function,
                    response_time_ms = waited.as_millis() as u64,
                    "Resolved pending request"
                );
                true
            }
            Err(_) => {
                // Caller went away between removal and delivery
                self.stats.unresolved_drops.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    device_id = %entry.device_id,
                    "Pending request receiver dropped"
                );
                false
            }
        }
    }

    /// Remove a slot without delivering anything. No-op if already gone.
    pub fn abandon(&self, correlation_id: CorrelationId) -> bool {
        match self.pending.remove(&correlation_id) {
            Some((_, entry)) => {
                self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    device_id = %entry.device_id,
                    function = %entry.function,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Abandoned pending request"
                );
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_open_and_resolve() {
        let table = PendingRequestTable::new();
        let mut slot = table.open("pc", FunctionName::AppControl);
        let id = slot.correlation_id();
        assert!(table.contains(&id));
        assert_eq!(table.len(), 1);

        assert!(table.resolve(id, json!("opened")));
        assert_eq!(slot.recv().await, Some(json!("opened")));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_second_resolve_is_noop() {
        let table = PendingRequestTable::new();
        let slot = table.open("pc", FunctionName::AppControl);
        let id = slot.correlation_id();

        assert!(table.resolve(id, json!(1)));
        assert!(!table.resolve(id, json!(2)));
        assert!(!table.abandon(id));

        let stats = table.stats().snapshot();
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved_drops, 1);
        assert_eq!(stats.abandoned, 0);
    }

    #[tokio::test]
    async fn test_abandon_then_resolve_drops() {
        let table = PendingRequestTable::new();
        let mut slot = table.open("pc", FunctionName::SystemControl);
        let id = slot.correlation_id();

        assert!(table.abandon(id));
        assert!(!table.abandon(id));
        assert!(!table.resolve(id, json!("late")));
        assert_eq!(slot.recv().await, None);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let table = PendingRequestTable::new();
        assert!(!table.resolve(CorrelationId::new(), json!(null)));
        assert_eq!(table.stats().snapshot().unresolved_drops, 1);
    }

    #[test]
    fn test_resolve_after_receiver_dropped() {
        let table = PendingRequestTable::new();
        let slot = table.open("pc", FunctionName::AppControl);
        let id = slot.correlation_id();
        drop(slot);

        assert!(!table.resolve(id, json!("nobody listening")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let table = PendingRequestTable::new();
        let id = CorrelationId::new();
        assert!(table.create(id, "pc", FunctionName::AppControl).is_some());
        assert!(table.create(id, "pc", FunctionName::AppControl).is_none());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_resolved_slot_keeps_payload_after_removal() {
        let table = PendingRequestTable::new();
        let mut slot = table.open("tab", FunctionName::WebsiteControl);

        table.resolve(slot.correlation_id(), json!("done"));
        assert!(!table.abandon(slot.correlation_id()));
        assert_eq!(slot.recv().await, Some(json!("done")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resolve_and_abandon_race_settles_once() {
        let table = Arc::new(PendingRequestTable::new());

        for _ in 0..200 {
            let slot = table.open("pc", FunctionName::AppControl);
            let id = slot.correlation_id();

            let t1 = {
                let table = table.clone();
                tokio::spawn(async move { table.resolve(id, json!("reply")) })
            };
            let t2 = {
                let table = table.clone();
                tokio::spawn(async move { table.abandon(id) })
            };

            let resolved = t1.await.unwrap();
            let abandoned = t2.await.unwrap();
            assert!(resolved ^ abandoned, "exactly one of resolve/abandon must win");
            drop(slot);
        }

        assert!(table.is_empty());
    }
}
