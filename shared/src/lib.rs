//! devlink shared protocol types
//!
//! This crate provides the envelope types, command vocabulary and codec used
//! between the command broker and the remote endpoints it controls.

pub mod codec;
pub mod envelope;
pub mod function;
pub mod lifecycle;

use std::time::{SystemTime, UNIX_EPOCH};

pub use envelope::{Arguments, CommandEnvelope, CorrelationId, Inbound, ReplyEnvelope};
pub use function::{FunctionError, FunctionName, ReplyPath};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing parameters shared by the broker and endpoints
pub mod defaults {
    /// Deadline for a command answered by a direct reply
    pub const DIRECT_REPLY_TIMEOUT_MS: u64 = 20_000;

    /// Deadline for a command answered through the ingestion path
    pub const INGESTED_REPLY_TIMEOUT_MS: u64 = 10_000;

    /// Initial endpoint reconnect delay
    pub const RECONNECT_DELAY_MS: u64 = 1_000;

    /// Upper bound for the endpoint reconnect backoff
    pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

    /// Capacity of the broker's unsolicited-data queue
    pub const INGESTION_QUEUE_CAPACITY: usize = 1_024;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_after_epoch() {
        assert!(now_ms() > 0);
    }
}
