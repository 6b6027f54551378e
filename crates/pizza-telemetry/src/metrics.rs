//! In-process metrics aggregation
//!
//! Counters here are cumulative for the life of the process: a flush reads and
//! reports them, it never resets them. Only the latency windows are trimmed.

use crate::{
    body::ObservedBody,
    config::MetricsConfig,
    event::now_unix_nanos,
    host::{HostProbe, SysinfoProbe},
    latency::LatencyWindow,
    samples::{MetricBatch, MetricSample, MetricValue},
    transport::TelemetrySink,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const ACTIVE_USERS: &str = "active_users";
pub const AUTH_ATTEMPTS_TOTAL: &str = "auth_attempts_total";
pub const CPU_USAGE_PERCENT: &str = "cpu_usage_percent";
pub const MEMORY_USAGE_PERCENT: &str = "memory_usage_percent";
pub const PIZZA_SOLD_TOTAL: &str = "pizza_sold_total";
pub const PIZZA_CREATION_FAILURES_TOTAL: &str = "pizza_creation_failures_total";
pub const PIZZA_REVENUE_TOTAL: &str = "pizza_revenue_total";
pub const ENDPOINT_LATENCY_MS: &str = "endpoint_latency_ms";
pub const PIZZA_CREATION_LATENCY_MS: &str = "pizza_creation_latency_ms";

/// Attribute value of the all-methods request sample
pub const ALL_METHODS: &str = "ALL";

struct AggregatorState {
    requests_by_method: BTreeMap<String, u64>,
    active_users: HashSet<String>,
    auth_success: u64,
    auth_failure: u64,
    pizza_sold: u64,
    pizza_failures: u64,
    pizza_revenue: f64,
    endpoint_latency: LatencyWindow,
    pizza_latency: LatencyWindow,
}

impl AggregatorState {
    fn new(latency_capacity: usize) -> Self {
        Self {
            requests_by_method: BTreeMap::new(),
            active_users: HashSet::new(),
            auth_success: 0,
            auth_failure: 0,
            pizza_sold: 0,
            pizza_failures: 0,
            pizza_revenue: 0.0,
            endpoint_latency: LatencyWindow::new(latency_capacity),
            pizza_latency: LatencyWindow::new(latency_capacity),
        }
    }
}

/// Process-wide metric state, shared by handle between hooks and the scheduler
pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
    source: String,
    trim_threshold: usize,
    trim_keep: usize,
    host: Arc<dyn HostProbe>,
}

impl MetricsAggregator {
    pub fn new(config: &MetricsConfig) -> Self {
        Self::with_host_probe(config, Arc::new(SysinfoProbe::new()))
    }

    pub fn with_host_probe(config: &MetricsConfig, host: Arc<dyn HostProbe>) -> Self {
        Self {
            state: Mutex::new(AggregatorState::new(config.latency_capacity)),
            source: config.source.clone(),
            trim_threshold: config.trim_threshold,
            trim_keep: config.trim_keep,
            host,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Count a request and start its latency timer
    pub fn on_request(&self, method: &str, path: &str) -> RequestTimer {
        *self
            .state
            .lock()
            .requests_by_method
            .entry(method.to_string())
            .or_insert(0) += 1;

        RequestTimer {
            started: Instant::now(),
            endpoint: format!("{} {}", method, path),
        }
    }

    pub fn record_endpoint_latency(&self, latency_ms: f64) {
        if latency_ms.is_finite() {
            self.state.lock().endpoint_latency.push(latency_ms);
        }
    }

    pub fn on_auth_attempt(&self, success: bool) {
        let mut state = self.state.lock();
        if success {
            state.auth_success += 1;
        } else {
            state.auth_failure += 1;
        }
    }

    pub fn on_user_login(&self, user_id: impl Into<String>) {
        self.state.lock().active_users.insert(user_id.into());
    }

    pub fn on_user_logout(&self, user_id: &str) {
        self.state.lock().active_users.remove(user_id);
    }

    /// Record a pizza order outcome.
    ///
    /// A missing price counts as 0. Negative or non-finite prices are ignored so the
    /// revenue total never decreases.
    pub fn on_pizza_purchase(&self, success: bool, latency_ms: Option<f64>, price: Option<f64>) {
        let mut state = self.state.lock();
        if success {
            state.pizza_sold += 1;
            match price {
                Some(price) if price.is_finite() && price >= 0.0 => state.pizza_revenue += price,
                Some(price) => debug!(
                    telemetry.event = "pizza_price_ignored",
                    price,
                    "Ignoring invalid pizza price"
                ),
                None => {}
            }
        } else {
            state.pizza_failures += 1;
        }

        if let Some(latency) = latency_ms.filter(|l| l.is_finite()) {
            state.pizza_latency.push(latency);
        }
    }

    /// Build the metric batch for this cycle, then trim the latency windows
    pub fn flush(&self) -> MetricBatch {
        let host = self.host.sample();
        let timestamp = now_unix_nanos();
        let mut samples = Vec::new();

        let mut state = self.state.lock();

        let mut all_methods = 0u64;
        for (method, count) in &state.requests_by_method {
            all_methods += count;
            if *count > 0 {
                samples.push(
                    MetricSample::sum(HTTP_REQUESTS_TOTAL, "1", int(*count))
                        .with_attribute("method", method.as_str()),
                );
            }
        }
        samples.push(
            MetricSample::sum(HTTP_REQUESTS_TOTAL, "1", int(all_methods))
                .with_attribute("method", ALL_METHODS),
        );

        samples.push(MetricSample::gauge(
            ACTIVE_USERS,
            "1",
            int(state.active_users.len() as u64),
        ));

        samples.push(
            MetricSample::sum(AUTH_ATTEMPTS_TOTAL, "1", int(state.auth_success))
                .with_attribute("status", "success"),
        );
        samples.push(
            MetricSample::sum(AUTH_ATTEMPTS_TOTAL, "1", int(state.auth_failure))
                .with_attribute("status", "failure"),
        );

        samples.push(MetricSample::gauge(
            CPU_USAGE_PERCENT,
            "%",
            MetricValue::Double(host.cpu_usage_percent()),
        ));
        samples.push(MetricSample::gauge(
            MEMORY_USAGE_PERCENT,
            "%",
            MetricValue::Double(host.memory_usage_percent()),
        ));

        samples.push(MetricSample::sum(PIZZA_SOLD_TOTAL, "1", int(state.pizza_sold)));
        samples.push(MetricSample::sum(
            PIZZA_CREATION_FAILURES_TOTAL,
            "1",
            int(state.pizza_failures),
        ));
        samples.push(MetricSample::sum(
            PIZZA_REVENUE_TOTAL,
            "BTC",
            MetricValue::Double(state.pizza_revenue),
        ));

        if let Some(mean) = state.endpoint_latency.mean() {
            samples.push(MetricSample::gauge(
                ENDPOINT_LATENCY_MS,
                "ms",
                MetricValue::Double(mean),
            ));
        }
        if let Some(mean) = state.pizza_latency.mean() {
            samples.push(MetricSample::gauge(
                PIZZA_CREATION_LATENCY_MS,
                "ms",
                MetricValue::Double(mean),
            ));
        }

        state
            .endpoint_latency
            .trim(self.trim_threshold, self.trim_keep);
        state.pizza_latency.trim(self.trim_threshold, self.trim_keep);
        drop(state);

        let samples = samples
            .into_iter()
            .map(|sample| {
                sample
                    .with_attribute("source", self.source.as_str())
                    .at(timestamp)
            })
            .collect();

        MetricBatch::new(samples)
    }

    /// One flush cycle: build the batch and hand it to `sink` in a single call
    pub fn flush_and_report(&self, sink: &dyn TelemetrySink) {
        let batch = self.flush();
        debug!(
            telemetry.event = "metrics_flushed",
            samples = batch.len(),
            "Metrics batch built"
        );
        sink.push_metrics(batch);
    }
}

fn int(value: u64) -> MetricValue {
    MetricValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Latency timer for one in-flight request
#[derive(Debug)]
pub struct RequestTimer {
    started: Instant,
    endpoint: String,
}

impl RequestTimer {
    /// "METHOD PATH" label, only used for diagnostics
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Record the elapsed milliseconds as an endpoint latency sample
    pub fn finish(self, aggregator: &MetricsAggregator) -> f64 {
        let latency_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        aggregator.record_endpoint_latency(latency_ms);
        debug!(
            telemetry.event = "request_timed",
            endpoint = %self.endpoint,
            latency_ms,
            "Request completed"
        );
        latency_ms
    }
}

/// Count every request and time it until its response body finishes
pub async fn track_requests(
    State(metrics): State<Arc<MetricsAggregator>>,
    request: Request,
    next: Next,
) -> Response {
    let timer = metrics.on_request(request.method().as_str(), request.uri().path());
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body = ObservedBody::new(body)
        .on_finish(move |_, _| {
            timer.finish(&metrics);
        })
        .into_body();

    Response::from_parts(parts, body)
}
