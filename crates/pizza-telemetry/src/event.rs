//! Log events and the logger that ships them

use crate::sanitization::Sanitizer;
use crate::transport::TelemetrySink;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity attached to every shipped log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    /// Map an HTTP status code to a level: 5xx error, 4xx warn, everything else info
    pub fn from_status(status: u16) -> Self {
        match status {
            500..=u16::MAX => EventLevel::Error,
            400..=499 => EventLevel::Warn,
            _ => EventLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

/// Origin of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Http,
    Db,
    Factory,
    Exception,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Http => "http",
            EventType::Db => "db",
            EventType::Factory => "factory",
            EventType::Exception => "exception",
        }
    }
}

/// A single sanitized log record, consumed once by a sink
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub level: EventLevel,
    pub event_type: EventType,
    pub timestamp_nanos: u64,
    pub labels: BTreeMap<String, String>,
    pub payload: Value,
}

/// Request/response pair captured by the HTTP interceptor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpExchange {
    pub authorized: bool,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub ip: Option<String>,
    pub req_body: Value,
    pub res_body: Value,
}

/// Current wall clock time in nanoseconds since the Unix epoch
pub fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Builds sanitized log events and hands them to a sink
pub struct EventLogger {
    source: String,
    sanitizer: Sanitizer,
    sink: Arc<dyn TelemetrySink>,
}

impl EventLogger {
    pub fn new(source: impl Into<String>, sanitizer: Sanitizer, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            source: source.into(),
            sanitizer,
            sink,
        }
    }

    /// Build an event without shipping it
    pub fn event(&self, level: EventLevel, event_type: EventType, payload: &Value) -> LogEvent {
        let labels = BTreeMap::from([
            ("component".to_string(), self.source.clone()),
            ("level".to_string(), level.as_str().to_string()),
            ("type".to_string(), event_type.as_str().to_string()),
        ]);

        LogEvent {
            level,
            event_type,
            timestamp_nanos: now_unix_nanos(),
            labels,
            payload: self.sanitizer.sanitize_json(payload),
        }
    }

    /// Sanitize, label and ship a payload
    pub fn log(&self, level: EventLevel, event_type: EventType, payload: &Value) {
        self.sink.push_logs(self.event(level, event_type, payload));
    }

    /// Log one HTTP exchange at the level derived from its status
    pub fn http(&self, exchange: &HttpExchange) {
        match serde_json::to_value(exchange) {
            Ok(payload) => self.log(
                EventLevel::from_status(exchange.status_code),
                EventType::Http,
                &payload,
            ),
            Err(e) => tracing::warn!(
                telemetry.event = "http_log_dropped",
                error = %e,
                "Failed to encode HTTP exchange"
            ),
        }
    }

    /// Log a database query with password-like bind values redacted
    pub fn db_query(&self, sql: &str, params: &[Value]) {
        let payload = json!({
            "sql": sql,
            "params": self.sanitizer.sanitize_params(params),
        });
        self.log(EventLevel::Info, EventType::Db, &payload);
    }

    /// Log a call to the pizza factory service
    pub fn factory_request(&self, request_body: Value, response_body: Value, status: u16) {
        let payload = json!({
            "reqBody": request_body,
            "resBody": response_body,
            "statusCode": status,
        });
        self.log(EventLevel::from_status(status), EventType::Factory, &payload);
    }

    /// Log an unhandled error; the status defaults to 500
    pub fn exception(&self, message: &str, status: Option<u16>) {
        let status = status.unwrap_or(500);
        let payload = json!({
            "message": message,
            "statusCode": status,
        });
        self.log(EventLevel::from_status(status), EventType::Exception, &payload);
    }
}
