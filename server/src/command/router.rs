//! Routes inbound device messages to pending requests or the ingestion queue

use super::ingestion::IngestionQueue;
use super::pending::PendingRequestTable;
use devlink_shared::codec::{self, CodecError};
use devlink_shared::Inbound;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where an inbound message ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Delivered to the dispatch call awaiting it
    Resolved,
    /// Queued as unsolicited data
    Ingested,
    /// Discarded because the frame was unusable
    Dropped,
}

/// Distinguishes direct replies from out-of-band reports
pub struct ReplyRouter {
    pending: Arc<PendingRequestTable>,
    queue: Arc<IngestionQueue>,
}

impl ReplyRouter {
    pub fn new(pending: Arc<PendingRequestTable>, queue: Arc<IngestionQueue>) -> Self {
        Self { pending, queue }
    }

    /// Route a raw text frame from a device channel
    pub fn on_text(&self, device_id: &str, text: &str) -> Routed {
        match codec::decode_inbound(text) {
            Ok(inbound) => self.route(device_id, inbound),
            Err(CodecError::Json(e)) => {
                debug!(device_id, error = %e, "Non-JSON frame, ingesting as text");
                self.ingest(device_id, Value::String(text.to_string()))
            }
            Err(e) => {
                warn!(device_id, error = %e, "Dropping inbound frame");
                Routed::Dropped
            }
        }
    }

    /// Route a decoded message from a device channel
    pub fn on_message(&self, device_id: &str, message: Value) -> Routed {
        self.route(device_id, Inbound::classify(message))
    }

    fn route(&self, device_id: &str, inbound: Inbound) -> Routed {
        match inbound {
            Inbound::Reply {
                correlation_id,
                result,
                message,
            } => {
                if self.pending.resolve(correlation_id, result) {
                    debug!(device_id, correlation_id = %correlation_id, "<<< Reply matched");
                    return Routed::Resolved;
                }
                debug!(
                    device_id,
                    correlation_id = %correlation_id,
                    "<<< Reply matched no pending request, ingesting"
                );
                self.ingest(device_id, message)
            }
            Inbound::Unsolicited(message) => self.ingest(device_id, message),
        }
    }

    fn ingest(&self, device_id: &str, message: Value) -> Routed {
        if let Some(evicted) = self.queue.push(message) {
            warn!(
                device_id,
                capacity = self.queue.capacity(),
                %evicted,
                "Ingestion queue full, evicted oldest item"
            );
        }
        Routed::Ingested
    }
}
