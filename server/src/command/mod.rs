//! Command dispatch and reply correlation for the broker
//!
//! This module handles:
//! - Sending commands to specific devices and awaiting their outcome
//! - Tracking pending requests by correlation id
//! - Routing inbound device messages to the waiting caller or the ingestion queue

mod dispatcher;
mod ingestion;
mod pending;
mod router;

pub use dispatcher::{CommandDispatcher, DispatchStats, DispatchStatsSnapshot};
pub use ingestion::IngestionQueue;
pub use pending::{PendingRequestTable, PendingSlot, PendingStats, PendingStatsSnapshot};
pub use router::{ReplyRouter, Routed};
