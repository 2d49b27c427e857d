use anyhow::Result;
use clap::Parser;
use devlink_server::logging::{init_tracing, LogBroadcaster};
use devlink_server::{transport, Broker, BrokerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "devlink-server")]
#[command(about = "Command broker for remote devices")]
struct Args {
    /// Device websocket and caller API address
    #[arg(long, env = "DEVLINK_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Out-of-band report ingress address
    #[arg(long, env = "DEVLINK_INGEST_BIND", default_value = "0.0.0.0:8001")]
    ingest_bind: SocketAddr,

    /// Default deadline for direct replies, in milliseconds
    #[arg(long, env = "DEVLINK_DIRECT_TIMEOUT_MS", default_value_t = devlink_shared::defaults::DIRECT_REPLY_TIMEOUT_MS)]
    direct_timeout_ms: u64,

    /// Default deadline for ingested reports, in milliseconds
    #[arg(long, env = "DEVLINK_INGESTED_TIMEOUT_MS", default_value_t = devlink_shared::defaults::INGESTED_REPLY_TIMEOUT_MS)]
    ingested_timeout_ms: u64,

    /// Capacity of the unsolicited report queue
    #[arg(long, env = "DEVLINK_INGEST_CAPACITY", default_value_t = devlink_shared::defaults::INGESTION_QUEUE_CAPACITY)]
    ingest_capacity: usize,
}

impl Args {
    fn into_config(self) -> BrokerConfig {
        BrokerConfig {
            bind_addr: self.bind,
            ingest_addr: self.ingest_bind,
            direct_timeout: Duration::from_millis(self.direct_timeout_ms),
            ingested_timeout: Duration::from_millis(self.ingested_timeout_ms),
            ingest_capacity: self.ingest_capacity,
            ..BrokerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config();
    config.validate()?;

    let logs = LogBroadcaster::new(config.log_buffer);
    init_tracing(&logs);

    info!("devlink broker starting");

    let broker = Arc::new(Broker::new(config, logs));
    transport::serve(broker).await
}
