//! Network surfaces of the broker
//!
//! - Main listener: device websockets, the caller dispatch API, health and log streaming
//! - Ingress listener: out-of-band reports pushed by endpoints

mod ingress;
mod routes;
mod server;

pub use ingress::{ingress_routes, IngestResponse};
pub use routes::{routes, DispatchRequest, DispatchResponse, ErrorBody};
pub use server::{serve, serve_with_shutdown, shutdown_signal, Listeners};
