//! Out-of-band ingress: endpoints push reports here instead of replying on
//! their command channel.

use std::sync::Arc;

use axum::{Router, extract::State, response::Json, routing::post};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::Broker;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub received: Value,
}

async fn ingest(
    State(broker): State<Arc<Broker>>,
    Json(payload): Json<Value>,
) -> Json<IngestResponse> {
    if let Some(evicted) = broker.queue.push(payload.clone()) {
        warn!(
            capacity = broker.queue.capacity(),
            %evicted,
            "Ingestion queue full, evicted oldest item"
        );
    }
    debug!(queued = broker.queue.len(), "Report ingested");

    Json(IngestResponse {
        status: "ok",
        received: payload,
    })
}

/// Routes served on the ingress listener
pub fn ingress_routes(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .with_state(broker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Routed;
    use crate::config::BrokerConfig;
    use crate::logging::LogBroadcaster;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use devlink_shared::{CorrelationId, Inbound};
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn post_ingest(body: Value) -> Request<Body> {
        Request::post("/ingest")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn ingest_queues_payload_verbatim() {
        let broker = Arc::new(Broker::new(BrokerConfig::default(), LogBroadcaster::new(4)));
        let payload = json!({"info": "battery", "value": "81%"});

        let response = ingress_routes(broker.clone())
            .oneshot(post_ingest(payload.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["received"], payload);

        assert_eq!(broker.queue.pop(Duration::from_millis(10)).await, Some(payload));
    }

    #[tokio::test]
    async fn ingest_on_full_queue_evicts_oldest() {
        let config = BrokerConfig {
            ingest_capacity: 1,
            ..BrokerConfig::default()
        };
        let broker = Arc::new(Broker::new(config, LogBroadcaster::new(4)));
        let app = ingress_routes(broker.clone());

        let first = app.clone().oneshot(post_ingest(json!(1))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(post_ingest(json!(2))).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(broker.queue.len(), 1);
        assert_eq!(broker.queue.evicted(), 1);
        assert_eq!(broker.queue.pop(Duration::from_millis(10)).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn late_replies_do_not_block_ingest() {
        let config = BrokerConfig {
            ingest_capacity: 2,
            ..BrokerConfig::default()
        };
        let broker = Arc::new(Broker::new(config, LogBroadcaster::new(4)));

        // Replies for requests that already timed out
        for _ in 0..2 {
            let late = json!({"correlationId": CorrelationId::new().to_string(), "result": "late"});
            assert_eq!(broker.router.on_message("pc", late), Routed::Ingested);
        }
        assert_eq!(broker.pending.stats().snapshot().unresolved_drops, 2);

        let fresh = json!({"info": "location", "value": "fresh"});
        let response = ingress_routes(broker.clone())
            .oneshot(post_ingest(fresh.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let deadline = tokio::time::Instant::now() + Duration::from_millis(10);
        let report = broker
            .queue
            .pop_matching(None, deadline, |item| !Inbound::is_reply(item))
            .await;
        assert_eq!(report, Some(fresh));
    }
}
