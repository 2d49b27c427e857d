//! Connection registry for tracking all connected devices

use super::connection::{DeviceChannel, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

struct RegistryEntry {
    channel: Arc<dyn DeviceChannel>,
    connected_at: Instant,
}

/// Snapshot of one connected device
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedDevice {
    pub device_id: String,
    pub session_id: SessionId,
    pub connected_secs: u64,
}

/// Maps endpoint identity to its live channel; at most one channel per identity
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, RegistryEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a channel, replacing any existing one for the same identity
    pub async fn register(&self, device_id: &str, channel: Arc<dyn DeviceChannel>) {
        let session_id = channel.session_id();
        let entry = RegistryEntry {
            channel,
            connected_at: Instant::now(),
        };

        let previous = self
            .sessions
            .write()
            .await
            .insert(device_id.to_string(), entry);

        match previous {
            Some(old) => info!(
                device_id,
                session_id,
                replaced_session = old.channel.session_id(),
                "Device reconnected, channel replaced"
            ),
            None => info!(device_id, session_id, "Device connected"),
        }
    }

    /// Remove the entry for an identity; no-op if absent
    pub async fn unregister(&self, device_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(device_id).is_some();
        if removed {
            info!(device_id, "Device disconnected");
        }
        removed
    }

    /// Remove the entry only if it still belongs to `session_id`.
    ///
    /// A replaced connection closing late must not evict its replacement.
    pub async fn unregister_session(&self, device_id: &str, session_id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get(device_id)
            .map(|entry| entry.channel.session_id());

        if current == Some(session_id) {
            sessions.remove(device_id);
            info!(device_id, session_id, "Device disconnected");
            true
        } else {
            false
        }
    }

    /// Get the live channel for a device
    pub async fn lookup(&self, device_id: &str) -> Option<Arc<dyn DeviceChannel>> {
        let sessions = self.sessions.read().await;
        sessions.get(device_id).map(|e| e.channel.clone())
    }

    /// Get all connected devices, sorted by identity
    pub async fn connected_devices(&self) -> Vec<ConnectedDevice> {
        let sessions = self.sessions.read().await;
        let mut devices: Vec<_> = sessions
            .iter()
            .map(|(id, entry)| ConnectedDevice {
                device_id: id.clone(),
                session_id: entry.channel.session_id(),
                connected_secs: entry.connected_at.elapsed().as_secs(),
            })
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Get the number of connected devices
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
