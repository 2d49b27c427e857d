//! Session management for tracking connected devices
//!
//! This module handles:
//! - The registry of live device channels, one per endpoint identity
//! - Channel replacement on reconnect
//! - Websocket send/receive halves for a device connection

mod connection;
mod registry;

pub use connection::{next_session_id, DeviceChannel, DeviceSession, SessionHandle, SessionId};
pub use registry::{ConnectedDevice, ConnectionRegistry};

#[cfg(test)]
pub(crate) mod testing {
    use super::{next_session_id, DeviceChannel, SessionId};
    use crate::error::ChannelError;
    use async_trait::async_trait;
    use devlink_shared::CommandEnvelope;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    /// In-memory channel that records every command sent on it
    pub struct RecordingChannel {
        session_id: SessionId,
        fail: AtomicBool,
        sent_count: AtomicUsize,
        tx: mpsc::UnboundedSender<CommandEnvelope>,
        rx: Mutex<mpsc::UnboundedReceiver<CommandEnvelope>>,
    }

    impl RecordingChannel {
        pub fn new() -> Arc<Self> {
            let (tx, rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                session_id: next_session_id(),
                fail: AtomicBool::new(false),
                sent_count: AtomicUsize::new(0),
                tx,
                rx: Mutex::new(rx),
            })
        }

        /// A channel whose sends always fail
        pub fn failing() -> Arc<Self> {
            let channel = Self::new();
            channel.fail.store(true, Ordering::SeqCst);
            channel
        }

        pub fn sent_count(&self) -> usize {
            self.sent_count.load(Ordering::SeqCst)
        }

        /// Wait for the next command sent on this channel
        pub async fn next_sent(&self) -> CommandEnvelope {
            self.rx
                .lock()
                .await
                .recv()
                .await
                .expect("recording channel sender dropped")
        }
    }

    #[async_trait]
    impl DeviceChannel for RecordingChannel {
        fn session_id(&self) -> SessionId {
            self.session_id
        }

        async fn send(&self, command: &CommandEnvelope) -> Result<(), ChannelError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChannelError::Closed("connection reset".into()));
            }
            self.sent_count.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(command.clone());
            Ok(())
        }
    }
}
