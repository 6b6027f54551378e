//! Local diagnostics and the telemetry facade

use crate::{
    config::{DiagnosticsConfig, LogFormat, TelemetryConfig},
    event::EventLogger,
    host::{HostProbe, SysinfoProbe},
    interceptor::{log_requests, HttpLogger},
    metrics::{track_requests, MetricsAggregator},
    sanitization::Sanitizer,
    scheduler::MetricsScheduler,
    transport::{HttpCollector, TelemetrySink},
    Error, Result,
};
use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Installs the process-wide `tracing` subscriber used for local diagnostics
pub struct TelemetrySystem;

/// Guard returned by [`TelemetrySystem::init_diagnostics`]
pub struct TelemetryGuard {
    _private: (),
}

impl TelemetrySystem {
    /// Initialize local diagnostics with the given configuration
    pub fn init_diagnostics(config: &DiagnosticsConfig) -> Result<TelemetryGuard> {
        let filter = Self::build_env_filter(config)?;
        Registry::default()
            .with(Self::build_console_layer(config))
            .with(filter)
            .try_init()
            .map_err(|e| Error::System {
                message: format!("Failed to initialize tracing subscriber: {}", e),
            })?;

        tracing::info!(
            telemetry.event = "system_initialized",
            telemetry.version = env!("CARGO_PKG_VERSION"),
            "Diagnostics initialized"
        );

        Ok(TelemetryGuard { _private: () })
    }

    /// Build environment filter for log level filtering
    fn build_env_filter(config: &DiagnosticsConfig) -> Result<EnvFilter> {
        // Allow environment override
        if let Ok(directives) = std::env::var("RUST_LOG") {
            return EnvFilter::try_new(directives).map_err(|e| Error::Config {
                message: format!("Invalid RUST_LOG directives: {}", e),
            });
        }

        let level: Level = config.level.into();
        let mut filter = EnvFilter::new(level.to_string());
        for directive in ["hyper=warn", "reqwest=warn", "h2=warn"] {
            let directive = directive.parse().map_err(|e| Error::Config {
                message: format!("Invalid filter directive {}: {}", directive, e),
            })?;
            filter = filter.add_directive(directive);
        }

        Ok(filter)
    }

    /// Diagnostics go to stderr; stdout stays free for command output
    fn build_console_layer(config: &DiagnosticsConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
        match config.format {
            LogFormat::Json => fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_writer(std::io::stderr)
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_target(false)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // This happens during program shutdown, so the line may not make it out
        tracing::info!(
            telemetry.event = "system_shutdown",
            "Telemetry system shutting down"
        );
    }
}

/// Everything the service needs to emit telemetry, wired from one config.
///
/// Handles are explicit: hand [`Telemetry::metrics`] and [`Telemetry::logger`] to
/// the code that raises business events.
pub struct Telemetry {
    config: TelemetryConfig,
    sink: Arc<dyn TelemetrySink>,
    logger: Arc<EventLogger>,
    metrics: Arc<MetricsAggregator>,
    scheduler: MetricsScheduler,
}

impl Telemetry {
    /// Ship to the HTTP collectors named in `config`
    pub fn from_config(config: TelemetryConfig) -> Result<Self> {
        let sink: Arc<dyn TelemetrySink> = Arc::new(HttpCollector::new(&config)?);
        Self::with_sink(config, sink)
    }

    /// Ship to an arbitrary sink
    pub fn with_sink(config: TelemetryConfig, sink: Arc<dyn TelemetrySink>) -> Result<Self> {
        Self::with_host_probe(config, sink, Arc::new(SysinfoProbe::new()))
    }

    pub fn with_host_probe(
        config: TelemetryConfig,
        sink: Arc<dyn TelemetrySink>,
        host: Arc<dyn HostProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let sanitizer = Sanitizer::from_config(&config.privacy)?;
        let logger = Arc::new(EventLogger::new(
            config.logging.source.clone(),
            sanitizer,
            Arc::clone(&sink),
        ));
        let metrics = Arc::new(MetricsAggregator::with_host_probe(&config.metrics, host));
        let scheduler = MetricsScheduler::new(Arc::clone(&metrics), Arc::clone(&sink));

        Ok(Self {
            config,
            sink,
            logger,
            metrics,
            scheduler,
        })
    }

    /// Add the log interceptor and request tracking to `router`
    pub fn instrument<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let http_logger = HttpLogger::new(
            Arc::clone(&self.logger),
            self.config.privacy.max_capture_bytes,
        );

        router
            .layer(from_fn_with_state(Arc::clone(&self.metrics), track_requests))
            .layer(from_fn_with_state(http_logger, log_requests))
    }

    /// Arm the periodic metrics flush; calling it again re-arms
    pub fn start(&self) -> Result<()> {
        self.scheduler.start(self.config.metrics.flush_interval())
    }

    pub fn shutdown(&self) {
        self.scheduler.stop();
        tracing::info!(telemetry.event = "telemetry_shutdown", "Telemetry stopped");
    }

    pub fn logger(&self) -> Arc<EventLogger> {
        Arc::clone(&self.logger)
    }

    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    pub fn sink(&self) -> Arc<dyn TelemetrySink> {
        Arc::clone(&self.sink)
    }

    pub fn scheduler(&self) -> &MetricsScheduler {
        &self.scheduler
    }
}
