//! devlink broker library
//!
//! Tracks which endpoints are connected, sends them commands and matches each
//! asynchronous reply back to the call that requested it.

pub mod broker;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod transport;

pub use broker::Broker;
pub use command::{CommandDispatcher, IngestionQueue, PendingRequestTable, ReplyRouter};
pub use config::BrokerConfig;
pub use error::{ChannelError, ConfigError, DispatchError};
pub use session::ConnectionRegistry;
