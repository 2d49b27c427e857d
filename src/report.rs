//! Posts out-of-band reports to the broker's ingress

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// HTTP client for the broker's report ingress
#[derive(Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    url: String,
}

impl ReportClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("building report client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Push one report; fails on transport errors and non-2xx answers
    pub async fn send(&self, report: &Value) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .with_context(|| format!("posting report to {}", self.url))?;

        let status = response.status();
        response
            .error_for_status()
            .with_context(|| format!("ingress rejected report ({})", status))?;

        debug!(url = %self.url, "Report delivered");
        Ok(())
    }

    /// Deliver a report in the background so the caller can keep serving commands
    pub fn spawn_send(&self, report: Value) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.send(&report).await {
                error!("Failed to deliver report: {:#}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one HTTP request, answer with `status_line`, return the raw request
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/ingest", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_posts_report_as_json() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK").await;
        let client = ReportClient::new(url, Duration::from_secs(5)).unwrap();

        client
            .send(&json!({"info": "location", "value": "51.50,-0.12"}))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /ingest"));
        assert!(request.contains("\"info\":\"location\""));
    }

    #[tokio::test]
    async fn test_spawned_delivery_does_not_block_caller() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK").await;
        let client = ReportClient::new(url, Duration::from_secs(5)).unwrap();

        let delivery = client.spawn_send(json!({"info": "battery", "value": "64%"}));
        assert!(!delivery.is_finished());

        delivery.await.unwrap();
        let request = server.await.unwrap();
        assert!(request.contains("\"value\":\"64%\""));
    }

    #[tokio::test]
    async fn test_rejected_report_is_error() {
        let (url, server) = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        let client = ReportClient::new(url, Duration::from_secs(5)).unwrap();

        assert!(client.send(&json!({"info": "location"})).await.is_err());
        server.await.unwrap();
    }
}
