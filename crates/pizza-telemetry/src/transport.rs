//! Fire-and-forget delivery of logs and metrics to remote collectors

use crate::{
    config::TelemetryConfig,
    event::LogEvent,
    samples::MetricBatch,
    wire::{LogPushBody, MetricPushBody},
    Error, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use reqwest::{header, Client};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, warn};

/// Destination for telemetry. Both calls return immediately and never fail.
pub trait TelemetrySink: Send + Sync {
    fn push_logs(&self, event: LogEvent);
    fn push_metrics(&self, batch: MetricBatch);
}

/// Credential header for the log collector
pub fn log_authorization(user_id: Option<&str>, api_key: &str) -> String {
    match user_id {
        Some(user_id) => format!("Bearer {}:{}", user_id, api_key),
        None => format!("Bearer {}", api_key),
    }
}

/// Credential header for the metric collector: Basic for `user:key` pairs, Bearer otherwise
pub fn metrics_authorization(api_key: &str) -> String {
    if api_key.contains(':') {
        format!("Basic {}", STANDARD.encode(api_key))
    } else {
        format!("Bearer {}", api_key)
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    authorization: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Run `task` on the current runtime without waiting for it
pub(crate) fn detach<F>(what: &'static str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => warn!(
            telemetry.event = "push_skipped",
            kind = what,
            "No async runtime available; telemetry dropped"
        ),
    }
}

/// HTTP client for the log (Loki) and metric (OTLP) collectors
#[derive(Clone)]
pub struct HttpCollector {
    client: Client,
    logs: Option<Endpoint>,
    metrics: Option<Endpoint>,
}

impl HttpCollector {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.transport.timeout())
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let logs = match (present(&config.logging.url), present(&config.logging.api_key)) {
            (Some(url), Some(api_key)) => Some(Endpoint {
                url: url.to_string(),
                authorization: log_authorization(present(&config.logging.user_id), api_key),
            }),
            _ => None,
        };

        let metrics = match (present(&config.metrics.url), present(&config.metrics.api_key)) {
            (Some(url), Some(api_key)) => Some(Endpoint {
                url: url.to_string(),
                authorization: metrics_authorization(api_key),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            logs,
            metrics,
        })
    }

    pub fn logs_enabled(&self) -> bool {
        self.logs.is_some()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }

    /// Push one log event and wait for the collector's answer
    pub async fn deliver_logs(&self, event: &LogEvent) -> Result<()> {
        let endpoint = self.logs.as_ref().ok_or_else(|| Error::Config {
            message: "log collector url/api_key not configured".to_string(),
        })?;
        let body = LogPushBody::from_event(event)?;
        post(&self.client, endpoint, &body).await
    }

    /// Push one metric batch and wait for the collector's answer
    pub async fn deliver_metrics(&self, batch: &MetricBatch) -> Result<()> {
        let endpoint = self.metrics.as_ref().ok_or_else(|| Error::Config {
            message: "metric collector url/api_key not configured".to_string(),
        })?;
        let body = MetricPushBody::from(batch);
        post(&self.client, endpoint, &body).await
    }
}

async fn post<T: Serialize>(client: &Client, endpoint: &Endpoint, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let response = client
        .post(&endpoint.url)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, &endpoint.authorization)
        .body(payload)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Collector {
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}

impl TelemetrySink for HttpCollector {
    fn push_logs(&self, event: LogEvent) {
        if !self.logs_enabled() {
            warn!(
                telemetry.event = "log_push_skipped",
                "Log collector url/api_key not configured"
            );
            return;
        }

        let collector = self.clone();
        detach("logs", async move {
            match collector.deliver_logs(&event).await {
                Ok(()) => debug!(telemetry.event = "log_pushed", "Log delivered"),
                Err(e) => warn!(
                    telemetry.event = "log_push_failed",
                    error = %e,
                    "Failed to send log to collector"
                ),
            }
        });
    }

    fn push_metrics(&self, batch: MetricBatch) {
        if !self.metrics_enabled() {
            warn!(
                telemetry.event = "metric_push_skipped",
                "Metric collector url/api_key not configured"
            );
            return;
        }

        let collector = self.clone();
        detach("metrics", async move {
            match collector.deliver_metrics(&batch).await {
                Ok(()) => debug!(
                    telemetry.event = "metrics_pushed",
                    samples = batch.len(),
                    "Metrics delivered"
                ),
                Err(e) => warn!(
                    telemetry.event = "metric_push_failed",
                    error = %e,
                    "Failed to push metrics to collector"
                ),
            }
        });
    }
}

/// Sink that keeps everything in memory
#[derive(Default)]
pub struct MemorySink {
    logs: Mutex<Vec<LogEvent>>,
    metrics: Mutex<Vec<MetricBatch>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.logs.lock().clone()
    }

    pub fn metric_batches(&self) -> Vec<MetricBatch> {
        self.metrics.lock().clone()
    }
}

#[cfg(test)]
impl MemorySink {
    /// Poll until at least `count` log events arrived or `timeout` elapsed
    pub async fn wait_for_logs(
        &self,
        count: usize,
        timeout: std::time::Duration,
    ) -> Vec<LogEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let logs = self.logs();
            if logs.len() >= count || tokio::time::Instant::now() >= deadline {
                return logs;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl TelemetrySink for MemorySink {
    fn push_logs(&self, event: LogEvent) {
        self.logs.lock().push(event);
    }

    fn push_metrics(&self, batch: MetricBatch) {
        self.metrics.lock().push(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLevel, EventType};
    use crate::samples::{MetricSample, MetricValue};
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn sample_event() -> LogEvent {
        LogEvent {
            level: EventLevel::Info,
            event_type: EventType::Http,
            timestamp_nanos: 1_000,
            labels: BTreeMap::from([("component".to_string(), "pizza".to_string())]),
            payload: json!({ "path": "/api/order" }),
        }
    }

    fn sample_batch() -> MetricBatch {
        MetricBatch::new(vec![MetricSample::sum(
            "pizza_sold_total",
            "1",
            MetricValue::Int(4),
        )
        .with_attribute("source", "pizza")
        .at(1_000)])
    }

    fn config_for(url: &str, metrics_key: &str) -> TelemetryConfig {
        let mut config = TelemetryConfig::default();
        config.logging.url = Some(format!("{}/loki/api/v1/push", url));
        config.logging.api_key = Some("log-key".to_string());
        config.logging.user_id = Some("1234".to_string());
        config.metrics.url = Some(format!("{}/otlp/v1/metrics", url));
        config.metrics.api_key = Some(metrics_key.to_string());
        config
    }

    async fn wait_until_matched(mock: &mockito::Mock) -> bool {
        for _ in 0..200 {
            if mock.matched_async().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn test_authorization_headers() {
        assert_eq!(log_authorization(Some("1234"), "key"), "Bearer 1234:key");
        assert_eq!(log_authorization(None, "key"), "Bearer key");
        assert_eq!(metrics_authorization("plain-token"), "Bearer plain-token");
        assert_eq!(metrics_authorization("1234:key"), "Basic MTIzNDprZXk=");
    }

    #[test]
    fn test_missing_credentials_disable_sinks() {
        let mut config = TelemetryConfig::default();
        config.logging.url = Some("https://logs.example.com".to_string());
        config.metrics.api_key = Some("".to_string());

        let collector = HttpCollector::new(&config).unwrap();
        assert!(!collector.logs_enabled());
        assert!(!collector.metrics_enabled());

        // No-op with a diagnostic, no panic
        collector.push_logs(sample_event());
        collector.push_metrics(sample_batch());
    }

    #[tokio::test]
    async fn test_deliver_logs_sends_loki_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/loki/api/v1/push")
            .match_header("content-type", "application/json")
            .match_header("authorization", "Bearer 1234:log-key")
            .match_body(Matcher::PartialJson(json!({
                "streams": [{ "stream": { "component": "pizza" }, "values": [["1000", "{\"path\":\"/api/order\"}"]] }]
            })))
            .with_status(204)
            .create_async()
            .await;

        let collector = HttpCollector::new(&config_for(&server.url(), "metrics-key")).unwrap();
        collector.deliver_logs(&sample_event()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_metrics_uses_basic_auth_for_pairs() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/otlp/v1/metrics")
            .match_header("authorization", "Basic MTIzNDprZXk=")
            .match_body(Matcher::PartialJson(json!({
                "resourceMetrics": [{ "scopeMetrics": [{ "metrics": [{ "name": "pizza_sold_total" }] }] }]
            })))
            .with_status(200)
            .create_async()
            .await;

        let collector = HttpCollector::new(&config_for(&server.url(), "1234:key")).unwrap();
        collector.deliver_metrics(&sample_batch()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_collector_error_is_reported_not_raised() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/otlp/v1/metrics")
            .with_status(500)
            .with_body("ingestion failed")
            .expect(2)
            .create_async()
            .await;

        let collector = HttpCollector::new(&config_for(&server.url(), "metrics-key")).unwrap();

        match collector.deliver_metrics(&sample_batch()).await {
            Err(Error::Collector { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "ingestion failed");
            }
            other => panic!("expected collector error, got {:?}", other.map(|_| ())),
        }

        // The fire-and-forget path swallows the same failure
        collector.push_metrics(sample_batch());

        assert!(wait_until_matched(&mock).await);
    }

    #[tokio::test]
    async fn test_push_logs_is_detached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/loki/api/v1/push")
            .with_status(200)
            .create_async()
            .await;

        let collector = HttpCollector::new(&config_for(&server.url(), "metrics-key")).unwrap();
        collector.push_logs(sample_event());

        assert!(wait_until_matched(&mock).await);
    }

    #[tokio::test]
    async fn test_unreachable_collector_does_not_raise() {
        let mut config = config_for("http://127.0.0.1:9", "metrics-key");
        config.transport.timeout_seconds = 1;
        let collector = HttpCollector::new(&config).unwrap();

        assert!(collector.deliver_logs(&sample_event()).await.is_err());
        collector.push_logs(sample_event());
    }

    #[test]
    fn test_push_without_runtime_is_dropped() {
        let collector =
            HttpCollector::new(&config_for("http://127.0.0.1:9", "metrics-key")).unwrap();
        collector.push_logs(sample_event());
        collector.push_metrics(sample_batch());
    }
}
