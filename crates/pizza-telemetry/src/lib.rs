//! # Pizza Telemetry
//!
//! Observability pipeline for the pizza ordering service.
//!
//! ## Features
//!
//! - **HTTP Log Interception**: one sanitized log event per request/response pair
//! - **Sanitization**: sensitive keys are redacted before anything leaves the process
//! - **Metrics Aggregation**: cumulative counters, active users and latency windows
//! - **Periodic Flush**: a re-armable scheduler pushing OTLP-JSON metric batches
//! - **Fire-and-forget Transport**: collector failures only ever reach local diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pizza_telemetry::{Telemetry, TelemetryConfig, TelemetrySystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TelemetryConfig::load(None).await?;
//!     let _guard = TelemetrySystem::init_diagnostics(&config.diagnostics)?;
//!
//!     let telemetry = Telemetry::from_config(config)?;
//!     telemetry.start()?;
//!
//!     let app = telemetry.instrument(axum::Router::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod config;
pub mod event;
pub mod host;
pub mod interceptor;
pub mod latency;
pub mod metrics;
pub mod samples;
pub mod sanitization;
pub mod scheduler;
pub mod system;
pub mod transport;
pub mod wire;


pub use config::{LogFormat, LogLevel, TelemetryConfig};
pub use event::{EventLevel, EventLogger, EventType, LogEvent};
pub use host::{HostLoad, HostProbe, SysinfoProbe};
pub use metrics::MetricsAggregator;
pub use samples::{MetricBatch, MetricSample};
pub use sanitization::{sanitize, sanitize_params, Sanitizer, REDACTION_MARKER};
pub use scheduler::MetricsScheduler;
pub use system::{Telemetry, TelemetryGuard, TelemetrySystem};
pub use transport::{HttpCollector, TelemetrySink};

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry-specific errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector rejected push: status {status}, body: {body}")]
    Collector { status: u16, body: String },

    #[error("Telemetry system error: {message}")]
    System { message: String },
}
