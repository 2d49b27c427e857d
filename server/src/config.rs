//! Broker configuration

use crate::error::ConfigError;
use devlink_shared::{codec::MAX_MESSAGE_SIZE, defaults};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the command broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Device websocket + caller API listener
    pub bind_addr: SocketAddr,
    /// Out-of-band ingress listener
    pub ingest_addr: SocketAddr,
    /// Deadline for direct-reply commands when the caller gives none
    pub direct_timeout: Duration,
    /// Deadline for ingested-answer commands when the caller gives none
    pub ingested_timeout: Duration,
    /// Capacity of the unsolicited-data queue
    pub ingest_capacity: usize,
    /// Largest inbound websocket frame accepted from a device
    pub max_message_size: usize,
    /// Lines buffered per log stream subscriber
    pub log_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            ingest_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            direct_timeout: Duration::from_millis(defaults::DIRECT_REPLY_TIMEOUT_MS),
            ingested_timeout: Duration::from_millis(defaults::INGESTED_REPLY_TIMEOUT_MS),
            ingest_capacity: defaults::INGESTION_QUEUE_CAPACITY,
            max_message_size: MAX_MESSAGE_SIZE,
            log_buffer: 256,
        }
    }
}

impl BrokerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr == self.ingest_addr && self.bind_addr.port() != 0 {
            return Err(ConfigError::SharedListener);
        }

        if self.direct_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "direct timeout cannot be 0".into(),
            ));
        }

        if self.ingested_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "ingested timeout cannot be 0".into(),
            ));
        }

        if self.ingest_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "ingest capacity cannot be 0".into(),
            ));
        }

        if self.max_message_size == 0 || self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(ConfigError::InvalidLimit(format!(
                "max message size must be within 1..={}",
                MAX_MESSAGE_SIZE
            )));
        }

        if self.log_buffer == 0 {
            return Err(ConfigError::InvalidLimit("log buffer cannot be 0".into()));
        }

        Ok(())
    }
}
