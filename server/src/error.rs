//! Error types for the broker

use devlink_shared::codec::CodecError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single channel send
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Encode failed: {0}")]
    Encode(#[from] CodecError),

    #[error("Channel closed: {0}")]
    Closed(String),
}

/// Typed outcome of a dispatch that did not produce a result
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Device '{0}' is not connected.")]
    NotConnected(String),

    #[error("Device '{device_id}' did not respond within {}ms.", .timeout.as_millis())]
    TimedOut { device_id: String, timeout: Duration },

    #[error("Sending to device '{device_id}' failed: {source}")]
    TransportFailure {
        device_id: String,
        #[source]
        source: ChannelError,
    },
}

impl DispatchError {
    /// Short machine-readable tag for API bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NotConnected(_) => "not_connected",
            DispatchError::TimedOut { .. } => "timed_out",
            DispatchError::TransportFailure { .. } => "transport_failure",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Device and ingress listeners must use different addresses")]
    SharedListener,

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}
