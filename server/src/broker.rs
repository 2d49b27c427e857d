//! The assembled broker: every shared component, constructed once and injected

use crate::command::{CommandDispatcher, IngestionQueue, PendingRequestTable, ReplyRouter};
use crate::config::BrokerConfig;
use crate::logging::LogBroadcaster;
use crate::session::ConnectionRegistry;
use serde::Serialize;
use std::sync::Arc;

/// Shared state handed to the transport handlers
pub struct Broker {
    pub config: BrokerConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub pending: Arc<PendingRequestTable>,
    pub queue: Arc<IngestionQueue>,
    pub router: ReplyRouter,
    pub dispatcher: CommandDispatcher,
    pub logs: LogBroadcaster,
}

impl Broker {
    pub fn new(config: BrokerConfig, logs: LogBroadcaster) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let pending = Arc::new(PendingRequestTable::new());
        let queue = Arc::new(IngestionQueue::new(config.ingest_capacity));
        let router = ReplyRouter::new(pending.clone(), queue.clone());
        let dispatcher = CommandDispatcher::new(registry.clone(), pending.clone(), queue.clone())
            .with_default_timeouts(config.direct_timeout, config.ingested_timeout);

        Self {
            config,
            registry,
            pending,
            queue,
            router,
            dispatcher,
            logs,
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            connected_devices: self.registry.count().await,
            pending_requests: self.pending.len(),
            queued_reports: self.queue.len(),
            evicted_reports: self.queue.evicted(),
            log_viewers: self.logs.viewer_count(),
            pending: self.pending.stats().snapshot(),
            dispatch: self.dispatcher.stats().snapshot(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub connected_devices: usize,
    pub pending_requests: usize,
    pub queued_reports: usize,
    pub evicted_reports: u64,
    pub log_viewers: usize,
    pub pending: crate::command::PendingStatsSnapshot,
    pub dispatch: crate::command::DispatchStatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::RecordingChannel;

    #[tokio::test]
    async fn test_health_reflects_components() {
        let broker = Broker::new(BrokerConfig::default(), LogBroadcaster::new(4));
        broker.registry.register("pc", RecordingChannel::new()).await;
        broker.queue.push(serde_json::json!({"battery": 80}));

        let health = broker.health().await;
        assert_eq!(health.connected_devices, 1);
        assert_eq!(health.pending_requests, 0);
        assert_eq!(health.queued_reports, 1);
        assert_eq!(health.dispatch.sent, 0);
    }
}
