//! Command dispatcher for sending commands to devices and awaiting their outcome

use super::ingestion::IngestionQueue;
use super::pending::{PendingRequestTable, PendingSlot};
use crate::error::DispatchError;
use crate::session::{ConnectionRegistry, DeviceChannel};
use devlink_shared::lifecycle::{RequestEvent, RequestLifecycle, RequestState, TransitionResult};
use devlink_shared::{defaults, Arguments, CommandEnvelope, CorrelationId, FunctionName, Inbound, ReplyPath};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Dispatch counters by terminal outcome
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub sent: AtomicU64,
    pub replied: AtomicU64,
    pub timed_out: AtomicU64,
    pub transport_failed: AtomicU64,
    pub not_connected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub sent: u64,
    pub replied: u64,
    pub timed_out: u64,
    pub transport_failed: u64,
    pub not_connected: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            replied: self.replied.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            transport_failed: self.transport_failed.load(Ordering::Relaxed),
            not_connected: self.not_connected.load(Ordering::Relaxed),
        }
    }
}

/// Abandons the slot when the awaiting call goes away, however it ends
struct SlotGuard<'a> {
    table: &'a PendingRequestTable,
    correlation_id: CorrelationId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.abandon(self.correlation_id);
    }
}

/// Dispatches commands to devices and matches their replies
pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingRequestTable>,
    queue: Arc<IngestionQueue>,
    direct_timeout: Duration,
    ingested_timeout: Duration,
    stats: DispatchStats,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pending: Arc<PendingRequestTable>,
        queue: Arc<IngestionQueue>,
    ) -> Self {
        Self {
            registry,
            pending,
            queue,
            direct_timeout: Duration::from_millis(defaults::DIRECT_REPLY_TIMEOUT_MS),
            ingested_timeout: Duration::from_millis(defaults::INGESTED_REPLY_TIMEOUT_MS),
            stats: DispatchStats::default(),
        }
    }

    /// Override the deadlines used when a caller gives none
    pub fn with_default_timeouts(mut self, direct: Duration, ingested: Duration) -> Self {
        self.direct_timeout = direct;
        self.ingested_timeout = ingested;
        self
    }

    pub fn default_timeout(&self, function: FunctionName) -> Duration {
        match function.reply_path() {
            ReplyPath::Direct => self.direct_timeout,
            ReplyPath::Ingested => self.ingested_timeout,
        }
    }

    /// Dispatch along the reply path the function uses
    pub async fn dispatch_command(
        &self,
        device_id: &str,
        function: FunctionName,
        arguments: Arguments,
        timeout: Option<Duration>,
    ) -> Result<Value, DispatchError> {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout(function));
        match function.reply_path() {
            ReplyPath::Direct => self.dispatch(device_id, function, arguments, timeout).await,
            ReplyPath::Ingested => {
                self.dispatch_report(device_id, function, arguments, timeout)
                    .await
            }
        }
    }

    /// Send a command and wait for the reply carrying its correlation id
    pub async fn dispatch(
        &self,
        device_id: &str,
        function: FunctionName,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, DispatchError> {
        let channel = self.lookup(device_id).await?;

        let mut slot = self.pending.open(device_id, function);
        let correlation_id = slot.correlation_id();
        let _guard = SlotGuard {
            table: &self.pending,
            correlation_id,
        };
        let mut lifecycle = RequestLifecycle::new();

        let envelope = CommandEnvelope::with_id(correlation_id, function, arguments);
        if let Err(source) = channel.send(&envelope).await {
            self.pending.abandon(correlation_id);
            self.settle(&mut lifecycle, RequestEvent::SendFailed, correlation_id);
            warn!(
                device_id,
                correlation_id = %correlation_id,
                error = %source,
                "Send failed"
            );
            return Err(DispatchError::TransportFailure {
                device_id: device_id.to_string(),
                source,
            });
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        info!(
            device_id,
            correlation_id = %correlation_id,
            function = %function,
            ">>> Sent command"
        );

        match self.await_slot(&mut slot, timeout).await {
            Some(result) => {
                self.settle(&mut lifecycle, RequestEvent::ReplyReceived, correlation_id);
                Ok(result)
            }
            None => {
                self.settle(&mut lifecycle, RequestEvent::DeadlineElapsed, correlation_id);
                warn!(
                    device_id,
                    correlation_id = %correlation_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Command timed out"
                );
                Err(DispatchError::TimedOut {
                    device_id: device_id.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Send a command whose answer arrives as a separately ingested report.
    ///
    /// No pending slot is created. The answer is the oldest item ingested
    /// after the send that is not a stale direct reply and that does not name
    /// another device or another `informationType`. Items passed over stay
    /// queued for other callers.
    pub async fn dispatch_report(
        &self,
        device_id: &str,
        function: FunctionName,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<Value, DispatchError> {
        let channel = self.lookup(device_id).await?;
        let since = Instant::now();
        let deadline = since + timeout;
        let mut lifecycle = RequestLifecycle::new();
        let info = arguments
            .get("informationType")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let envelope = CommandEnvelope::new(function, arguments);
        let correlation_id = envelope.correlation_id;
        if let Err(source) = channel.send(&envelope).await {
            self.settle(&mut lifecycle, RequestEvent::SendFailed, correlation_id);
            warn!(device_id, error = %source, "Send failed");
            return Err(DispatchError::TransportFailure {
                device_id: device_id.to_string(),
                source,
            });
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        info!(
            device_id,
            correlation_id = %correlation_id,
            function = %function,
            ">>> Sent command, awaiting ingested report"
        );

        let answer = self
            .queue
            .pop_matching(Some(since), deadline, |item| {
                answers_report(item, device_id, info.as_deref())
            })
            .await;

        match answer {
            Some(item) => {
                self.settle(&mut lifecycle, RequestEvent::ReplyReceived, correlation_id);
                Ok(item)
            }
            None => {
                self.settle(&mut lifecycle, RequestEvent::DeadlineElapsed, correlation_id);
                warn!(device_id, "Timed out waiting for ingested report");
                Err(DispatchError::TimedOut {
                    device_id: device_id.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn lookup(
        &self,
        device_id: &str,
    ) -> Result<Arc<dyn DeviceChannel>, DispatchError> {
        match self.registry.lookup(device_id).await {
            Some(channel) => Ok(channel),
            None => {
                self.stats.not_connected.fetch_add(1, Ordering::Relaxed);
                info!(device_id, "Device not connected");
                Err(DispatchError::NotConnected(device_id.to_string()))
            }
        }
    }

    /// Wait for the slot until `timeout`, then settle the deadline boundary
    async fn await_slot(&self, slot: &mut PendingSlot, timeout: Duration) -> Option<Value> {
        match time::timeout(timeout, slot.recv()).await {
            Ok(result) => result,
            Err(_) => self.claim_at_deadline(slot).await,
        }
    }

    /// Abandon the slot unless a reply already claimed it. When `resolve`
    /// removed the entry first, its payload is delivered or about to be.
    async fn claim_at_deadline(&self, slot: &mut PendingSlot) -> Option<Value> {
        if self.pending.abandon(slot.correlation_id()) {
            None
        } else {
            slot.recv().await
        }
    }

    fn settle(&self, lifecycle: &mut RequestLifecycle, event: RequestEvent, id: CorrelationId) {
        match lifecycle.apply(event) {
            TransitionResult::Success(state) => {
                let counter = match state {
                    RequestState::Replied => &self.stats.replied,
                    RequestState::TimedOut => &self.stats.timed_out,
                    RequestState::TransportFailed => &self.stats.transport_failed,
                    RequestState::Created => return,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    state = ?state,
                    elapsed_ms = lifecycle.elapsed_ms().unwrap_or_default(),
                    "Request settled"
                );
            }
            TransitionResult::Invalid { from, event } => {
                warn!(correlation_id = %id, ?from, ?event, "Request already settled");
            }
        }
    }

    /// Get count of pending commands
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

/// Whether an ingested item can be the report a device was asked for
fn answers_report(item: &Value, device_id: &str, info: Option<&str>) -> bool {
    if Inbound::is_reply(item) {
        return false;
    }
    let names = |key: &str, expected: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map_or(true, |value| value == expected)
    };
    names("device", device_id) && info.map_or(true, |info| names("info", info))
}
