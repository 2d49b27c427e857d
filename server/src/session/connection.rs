//! Individual device connection handling

use crate::error::ChannelError;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use devlink_shared::{codec, CommandEnvelope};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connection instance, distinct across reconnects of the same device
pub type SessionId = u64;

pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// The live duplex connection for one endpoint identity
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Connection instance this channel belongs to
    fn session_id(&self) -> SessionId;

    /// Send one command; sends on a channel arrive in call order
    async fn send(&self, command: &CommandEnvelope) -> Result<(), ChannelError>;
}

/// Handle to send commands to a specific device over its websocket
pub struct SessionHandle {
    device_id: String,
    session_id: SessionId,
    writer: Mutex<SplitSink<WebSocket, Message>>,
}

impl SessionHandle {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[async_trait]
impl DeviceChannel for SessionHandle {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    async fn send(&self, command: &CommandEnvelope) -> Result<(), ChannelError> {
        let text = codec::encode_command(command)?;
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelError::Closed(e.to_string()))
    }
}

/// Inbound half of an active device websocket
pub struct DeviceSession {
    device_id: String,
    reader: SplitStream<WebSocket>,
}

impl DeviceSession {
    /// Split an upgraded websocket into the inbound session and a send handle
    pub fn new(socket: WebSocket, device_id: String) -> (Self, SessionHandle) {
        let (writer, reader) = socket.split();
        let handle = SessionHandle {
            device_id: device_id.clone(),
            session_id: next_session_id(),
            writer: Mutex::new(writer),
        };
        (Self { device_id, reader }, handle)
    }

    /// Read the next text payload from this session
    /// Returns None if the connection is closed
    pub async fn recv(&mut self) -> Option<String> {
        while let Some(frame) = self.reader.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(text),
                    Err(_) => {
                        warn!(device_id = %self.device_id, "Dropping non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    debug!(device_id = %self.device_id, "Close frame received");
                    return None;
                }
                Err(e) => {
                    warn!(device_id = %self.device_id, error = %e, "Read error");
                    return None;
                }
            }
        }
        None
    }
}
