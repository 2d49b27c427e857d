//! Listener setup and graceful shutdown for both network surfaces.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::broker::Broker;

use super::ingress::ingress_routes;
use super::routes::routes;

/// The two bound listeners, before serving starts
pub struct Listeners {
    device: TcpListener,
    ingest: TcpListener,
}

impl Listeners {
    pub async fn bind(device_addr: SocketAddr, ingest_addr: SocketAddr) -> anyhow::Result<Self> {
        let device = TcpListener::bind(device_addr)
            .await
            .with_context(|| format!("binding device listener on {}", device_addr))?;
        let ingest = TcpListener::bind(ingest_addr)
            .await
            .with_context(|| format!("binding ingress listener on {}", ingest_addr))?;
        Ok(Self { device, ingest })
    }

    pub fn device_addr(&self) -> std::io::Result<SocketAddr> {
        self.device.local_addr()
    }

    pub fn ingest_addr(&self) -> std::io::Result<SocketAddr> {
        self.ingest.local_addr()
    }
}

/// Serve until SIGINT or SIGTERM.
pub async fn serve(broker: Arc<Broker>) -> anyhow::Result<()> {
    let listeners = Listeners::bind(broker.config.bind_addr, broker.config.ingest_addr).await?;
    serve_with_shutdown(listeners, broker, shutdown_signal()).await
}

/// Serve both listeners until `shutdown` completes.
pub async fn serve_with_shutdown<F>(
    listeners: Listeners,
    broker: Arc<Broker>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let device_addr = listeners.device_addr()?;
    let ingest_addr = listeners.ingest_addr()?;
    info!("Device and caller API listening on {}", device_addr);
    info!("Report ingress listening on {}", ingest_addr);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let device = axum::serve(listeners.device, routes(broker.clone()))
        .with_graceful_shutdown(wait_for_stop(stop_rx.clone()));
    let ingest = axum::serve(listeners.ingest, ingress_routes(broker))
        .with_graceful_shutdown(wait_for_stop(stop_rx));

    tokio::try_join!(
        async { device.await.context("device listener failed") },
        async { ingest.await.context("ingress listener failed") },
    )?;

    info!("Server shutdown complete");
    Ok(())
}

async fn wait_for_stop(mut stop_rx: watch::Receiver<bool>) {
    while !*stop_rx.borrow() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when the
/// tokio runtime is misconfigured.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
