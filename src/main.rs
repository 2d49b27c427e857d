mod actuator;
mod command;
mod connection;
mod report;

use actuator::DryRunActuator;
use anyhow::Result;
use clap::Parser;
use command::{CommandExecutor, Outcome};
use connection::{ConnectionConfig, ConnectionEvent, ConnectionManager};
use devlink_shared::ReplyEnvelope;
use report::ReportClient;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "device-agent")]
#[command(about = "Endpoint that executes commands from a devlink broker")]
struct Args {
    /// Endpoint identity to register under
    #[arg(long, env = "DEVLINK_DEVICE_ID", default_value = "pc")]
    device_id: String,

    /// Broker websocket base URL
    #[arg(long, env = "DEVLINK_SERVER", default_value = "ws://127.0.0.1:8000")]
    server: String,

    /// Broker report ingress URL
    #[arg(long, env = "DEVLINK_INGEST_URL", default_value = "http://127.0.0.1:8001/ingest")]
    ingest_url: String,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 5_000)]
    connect_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = ConnectionConfig {
        device_id: args.device_id,
        server_url: args.server,
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        ..Default::default()
    };

    info!("Device agent starting: {}", config.device_id);
    info!("  Broker: {}", config.ws_url());
    info!("  Report ingress: {}", args.ingest_url);

    let reports = ReportClient::new(args.ingest_url, Duration::from_secs(5))?;
    let executor = CommandExecutor::new(config.device_id.clone(), Arc::new(DryRunActuator::new()));
    let mut conn = ConnectionManager::new(config);

    // Main event loop
    loop {
        match conn.recv().await {
            Some(ConnectionEvent::Connected { url }) => {
                info!("Connected to {} as {}", url, conn.device_id());
            }
            Some(ConnectionEvent::Disconnected { reason }) => {
                warn!(
                    "Disconnected: {} ({} commands executed)",
                    reason,
                    executor.executed_count()
                );
            }
            Some(ConnectionEvent::ConnectionFailed { reason }) => {
                error!("Connection failed: {}", reason);
            }
            Some(ConnectionEvent::Received(command)) => match executor.execute(&command).await {
                Outcome::Reply(reply) => {
                    if let Err(e) = conn.send(reply).await {
                        error!("Failed to send reply: {}", e);
                    }
                }
                Outcome::Report(report) => {
                    reports.spawn_send(report);
                }
            },
            Some(ConnectionEvent::Malformed {
                correlation_id,
                reason,
            }) => {
                warn!("Malformed command: {}", reason);
                if let Some(id) = correlation_id {
                    let reply = ReplyEnvelope::new(id, format!("Rejected: {}", reason));
                    if let Err(e) = conn.send(reply).await {
                        error!("Failed to send reply: {}", e);
                    }
                } else {
                    debug!("No correlation id, nothing to answer");
                }
            }
            None => {
                error!("Connection manager closed");
                break;
            }
        }
    }

    Ok(())
}
