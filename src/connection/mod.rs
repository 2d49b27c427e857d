//! Connection management for the broker websocket
//!
//! This module handles:
//! - A persistent websocket under this agent's endpoint identity
//! - Automatic reconnection with exponential backoff
//! - Decoding commands and queuing replies

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager};
