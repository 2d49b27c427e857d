//! Connection manager with a persistent broker websocket and automatic reconnection

use anyhow::{anyhow, Result};
use devlink_shared::{codec, defaults, CommandEnvelope, CorrelationId, ReplyEnvelope};
use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type BrokerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Successfully connected to the broker
    Connected { url: String },
    /// Disconnected from the broker
    Disconnected { reason: String },
    /// Received a command from the broker
    Received(CommandEnvelope),
    /// A frame that is not a usable command; the id is kept when readable
    Malformed {
        correlation_id: Option<CorrelationId>,
        reason: String,
    },
    /// A connection attempt failed; another follows after the backoff delay
    ConnectionFailed { reason: String },
}

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint identity this agent registers under
    pub device_id: String,
    /// Broker base URL, e.g. `ws://127.0.0.1:8000`
    pub server_url: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            device_id: "pc".into(),
            server_url: "ws://127.0.0.1:8000".into(),
            reconnect_delay: Duration::from_millis(defaults::RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(defaults::MAX_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    /// Full websocket URL for this device
    pub fn ws_url(&self) -> String {
        format!(
            "{}/ws/device/{}",
            self.server_url.trim_end_matches('/'),
            self.device_id
        )
    }
}

/// Double the delay, capped at `max`
pub fn next_delay(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current * 2, max)
}

/// Manages the persistent connection to the broker
pub struct ConnectionManager {
    config: ConnectionConfig,
    /// Channel to send replies to the broker
    outbound_tx: mpsc::Sender<ReplyEnvelope>,
    /// Channel to receive connection events
    event_rx: mpsc::Receiver<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager and start the connection loop
    pub fn new(config: ConnectionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<ReplyEnvelope>(100);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);

        let config_clone = config.clone();
        tokio::spawn(async move {
            connection_loop(config_clone, outbound_rx, event_tx).await;
        });

        Self {
            config,
            outbound_tx,
            event_rx,
        }
    }

    /// Queue a reply; replies queued while disconnected go out after reconnect
    pub async fn send(&self, reply: ReplyEnvelope) -> Result<()> {
        self.outbound_tx
            .send(reply)
            .await
            .map_err(|_| anyhow!("Connection closed"))
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Get the device ID
    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: ConnectionConfig,
    mut outbound_rx: mpsc::Receiver<ReplyEnvelope>,
    event_tx: mpsc::Sender<ConnectionEvent>,
) {
    let url = config.ws_url();
    let mut reconnect_delay = config.reconnect_delay;
    // A reply whose write failed, resent first on the next connection
    let mut held: Option<ReplyEnvelope> = None;

    loop {
        let event = match timeout(config.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((socket, _))) => {
                reconnect_delay = config.reconnect_delay;

                if event_tx
                    .send(ConnectionEvent::Connected { url: url.clone() })
                    .await
                    .is_err()
                {
                    return;
                }

                let reason = match handle_connection(socket, &mut outbound_rx, &mut held, &event_tx).await {
                    Ok(()) => "Broker closed connection".to_string(),
                    Err(e) => e.to_string(),
                };
                ConnectionEvent::Disconnected { reason }
            }
            Ok(Err(e)) => ConnectionEvent::ConnectionFailed {
                reason: e.to_string(),
            },
            Err(_) => ConnectionEvent::ConnectionFailed {
                reason: format!("Connect timed out after {:?}", config.connect_timeout),
            },
        };

        if event_tx.send(event).await.is_err() {
            return;
        }

        // Wait before reconnecting
        tokio::time::sleep(reconnect_delay).await;

        // Exponential backoff
        reconnect_delay = next_delay(reconnect_delay, config.max_reconnect_delay);
    }
}

/// Handle an active connection until it closes
async fn handle_connection(
    socket: BrokerSocket,
    outbound_rx: &mut mpsc::Receiver<ReplyEnvelope>,
    held: &mut Option<ReplyEnvelope>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> Result<()> {
    let (mut writer, mut reader) = socket.split();

    if let Some(reply) = held.take() {
        debug!(correlation_id = %reply.correlation_id, "Resending held reply");
        write_reply(&mut writer, reply, held).await?;
    }

    loop {
        tokio::select! {
            // Send outbound replies
            Some(reply) = outbound_rx.recv() => {
                write_reply(&mut writer, reply, held).await?;
            }

            // Read incoming commands
            frame = reader.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = event_tx.send(classify_frame(text.as_str())).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let event = match std::str::from_utf8(&data) {
                            Ok(text) => classify_frame(text),
                            Err(_) => ConnectionEvent::Malformed {
                                correlation_id: None,
                                reason: "binary frame is not UTF-8".into(),
                            },
                        };
                        let _ = event_tx.send(event).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Close frame received");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(anyhow!("Read error: {}", e)),
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Write one reply. On a failed write the reply is kept in `held` for the
/// next connection; a reply that cannot be encoded is dropped.
async fn write_reply<W>(
    writer: &mut W,
    reply: ReplyEnvelope,
    held: &mut Option<ReplyEnvelope>,
) -> Result<()>
where
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    let text = match codec::encode_reply(&reply) {
        Ok(text) => text,
        Err(e) => {
            warn!(correlation_id = %reply.correlation_id, error = %e, "Dropping unencodable reply");
            return Ok(());
        }
    };
    if let Err(e) = writer.send(Message::Text(text.into())).await {
        *held = Some(reply);
        return Err(anyhow!("Write error: {}", e));
    }
    Ok(())
}

/// Decode a command frame, keeping the correlation id of a bad one if possible
fn classify_frame(text: &str) -> ConnectionEvent {
    match codec::decode_command(text) {
        Ok(command) => ConnectionEvent::Received(command),
        Err(e) => {
            let correlation_id: Option<CorrelationId> = serde_json::from_str::<Value>(text)
                .ok()
                .as_ref()
                .and_then(|v| v.get("correlationId"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok());
            ConnectionEvent::Malformed {
                correlation_id,
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlink_shared::FunctionName;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_backoff_is_capped() {
        let max = Duration::from_secs(30);
        let mut delay = Duration::from_secs(1);
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = next_delay(delay, max);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_ws_url() {
        let config = ConnectionConfig {
            device_id: "laptop".into(),
            server_url: "ws://broker:8000/".into(),
            ..Default::default()
        };
        assert_eq!(config.ws_url(), "ws://broker:8000/ws/device/laptop");
    }

    #[test]
    fn test_malformed_frame_keeps_correlation_id() {
        let id = CorrelationId::new();
        let text = json!({"correlationId": id.to_string(), "functionName": "Teleport"}).to_string();

        match classify_frame(&text) {
            ConnectionEvent::Malformed { correlation_id, .. } => {
                assert_eq!(correlation_id, Some(id))
            }
            other => panic!("expected malformed, got {:?}", other),
        }

        assert!(matches!(
            classify_frame("not json"),
            ConnectionEvent::Malformed {
                correlation_id: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_receives_commands_and_sends_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut manager = ConnectionManager::new(ConnectionConfig {
            server_url: format!("ws://{}", addr),
            ..Default::default()
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut broker = accept_async(stream).await.unwrap();

        assert!(matches!(
            manager.recv().await,
            Some(ConnectionEvent::Connected { .. })
        ));

        let command = CommandEnvelope::new(FunctionName::SystemControl, Default::default());
        let text = codec::encode_command(&command).unwrap();
        broker.send(Message::Text(text.into())).await.unwrap();

        match manager.recv().await {
            Some(ConnectionEvent::Received(received)) => assert_eq!(received, command),
            other => panic!("expected command, got {:?}", other),
        }

        manager
            .send(ReplyEnvelope::new(command.correlation_id, "locked"))
            .await
            .unwrap();

        let frame = broker.next().await.unwrap().unwrap();
        let reply: ReplyEnvelope = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(reply.correlation_id, command.correlation_id);
        assert_eq!(reply.result, json!("locked"));

        drop(broker);
        assert!(matches!(
            manager.recv().await,
            Some(ConnectionEvent::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_write_holds_reply() {
        let reply = ReplyEnvelope::new(CorrelationId::new(), "volume set");
        let mut held = None;

        let (mut closed, rx) = futures::channel::mpsc::channel::<Message>(1);
        drop(rx);
        assert!(write_reply(&mut closed, reply.clone(), &mut held).await.is_err());
        assert_eq!(held, Some(reply.clone()));

        let (mut open, mut rx) = futures::channel::mpsc::channel::<Message>(1);
        let resend = held.take().unwrap();
        write_reply(&mut open, resend, &mut held).await.unwrap();
        assert_eq!(held, None);

        let frame = rx.next().await.unwrap();
        let sent: ReplyEnvelope = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(sent, reply);
    }

    #[tokio::test]
    async fn test_reply_queued_while_disconnected_goes_out_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut manager = ConnectionManager::new(ConnectionConfig {
            server_url: format!("ws://{}", addr),
            reconnect_delay: Duration::from_millis(10),
            ..Default::default()
        });

        let (stream, _) = listener.accept().await.unwrap();
        let broker = accept_async(stream).await.unwrap();
        assert!(matches!(
            manager.recv().await,
            Some(ConnectionEvent::Connected { .. })
        ));
        drop(broker);
        assert!(matches!(
            manager.recv().await,
            Some(ConnectionEvent::Disconnected { .. })
        ));

        let reply = ReplyEnvelope::new(CorrelationId::new(), "typed");
        manager.send(reply.clone()).await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut broker = accept_async(stream).await.unwrap();
        let frame = broker.next().await.unwrap().unwrap();
        let sent: ReplyEnvelope = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(sent, reply);
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut manager = ConnectionManager::new(ConnectionConfig {
            server_url: format!("ws://{}", addr),
            ..Default::default()
        });

        assert!(matches!(
            manager.recv().await,
            Some(ConnectionEvent::ConnectionFailed { .. })
        ));
    }
}
