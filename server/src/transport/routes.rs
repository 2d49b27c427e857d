//! Device websocket and caller-facing HTTP routes on the main listener.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use devlink_shared::{Arguments, FunctionName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::broker::{Broker, HealthSnapshot};
use crate::error::DispatchError;
use crate::logging::LogBroadcaster;
use crate::session::{ConnectedDevice, DeviceChannel, DeviceSession};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub device: String,
    pub function_name: String,
    #[serde(default)]
    pub arguments: Arguments,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub device: String,
    pub function_name: FunctionName,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: String) -> Response {
    (status, Json(ErrorBody { error, message })).into_response()
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::NotConnected(_) => StatusCode::NOT_FOUND,
            DispatchError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::TransportFailure { .. } => StatusCode::BAD_GATEWAY,
        };
        error_response(status, self.kind(), self.to_string())
    }
}

async fn device_socket(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    State(broker): State<Arc<Broker>>,
) -> Response {
    ws.max_message_size(broker.config.max_message_size)
        .on_upgrade(move |socket| run_device_session(socket, device_id, broker))
}

/// Register the device, route every inbound frame, unregister on close.
async fn run_device_session(socket: WebSocket, device_id: String, broker: Arc<Broker>) {
    let (mut session, handle) = DeviceSession::new(socket, device_id.clone());
    let session_id = handle.session_id();
    broker.registry.register(&device_id, Arc::new(handle)).await;

    while let Some(text) = session.recv().await {
        let routed = broker.router.on_text(&device_id, &text);
        debug!(device_id = %device_id, ?routed, "<<< Inbound frame");
    }

    broker
        .registry
        .unregister_session(&device_id, session_id)
        .await;
}

async fn dispatch(
    State(broker): State<Arc<Broker>>,
    Json(request): Json<DispatchRequest>,
) -> Response {
    let function: FunctionName = match request.function_name.parse() {
        Ok(function) => function,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "invalid_request", e.to_string()),
    };
    if let Err(e) = function.validate_arguments(&request.arguments) {
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", e.to_string());
    }
    let timeout = match request.timeout_ms {
        Some(0) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "timeoutMs must be greater than 0".to_string(),
            );
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    match broker
        .dispatcher
        .dispatch_command(&request.device, function, request.arguments, timeout)
        .await
    {
        Ok(result) => Json(DispatchResponse {
            device: request.device,
            function_name: function,
            result,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_devices(State(broker): State<Arc<Broker>>) -> Json<Vec<ConnectedDevice>> {
    Json(broker.registry.connected_devices().await)
}

async fn health(State(broker): State<Arc<Broker>>) -> Json<HealthSnapshot> {
    Json(broker.health().await)
}

async fn log_socket(ws: WebSocketUpgrade, State(broker): State<Arc<Broker>>) -> Response {
    let logs = broker.logs.clone();
    ws.on_upgrade(move |socket| stream_logs(socket, logs))
}

/// Forward broker log lines until the viewer goes away
async fn stream_logs(mut socket: WebSocket, logs: LogBroadcaster) {
    let mut lines = logs.subscribe();
    info!("Log viewer connected");

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Ok(line) => {
                    if socket.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    let notice = format!("[{} log lines skipped]", skipped);
                    if socket.send(Message::Text(notice.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Log viewer disconnected");
}

/// Routes served on the device/caller listener
pub fn routes(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/ws/device/{device_id}", get(device_socket))
        .route("/ws/logs", get(log_socket))
        .route("/dispatch", post(dispatch))
        .route("/devices", get(list_devices))
        .route("/health", get(health))
        .with_state(broker)
}
