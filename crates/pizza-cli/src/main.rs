use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use pizza_telemetry::{
    wire::MetricPushBody, HttpCollector, LogFormat, LogLevel, MetricsAggregator, Sanitizer,
    Telemetry, TelemetryConfig, TelemetrySystem,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true, help = "Path to telemetry configuration file")]
    config: Option<PathBuf>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, global = true, help = "Set log level")]
    log_level: Option<String>,

    /// Set log format (json, pretty, compact)
    #[arg(long, global = true, help = "Set log output format")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve an instrumented HTTP endpoint and ship its telemetry
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000", help = "Address to listen on")]
        bind: SocketAddr,
    },

    /// Print a sanitized copy of a JSON document
    Sanitize {
        #[arg(long, help = "Read JSON from this file instead of stdin")]
        file: Option<PathBuf>,
    },

    /// Build one metrics batch from the current host
    Flush {
        #[arg(long, help = "Print the push body instead of sending it")]
        dry_run: bool,
    },
}

/// Create telemetry configuration from CLI arguments
async fn create_telemetry_config(cli: &Cli) -> Result<TelemetryConfig> {
    // File, then environment overrides
    let mut config = TelemetryConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load telemetry configuration")?;

    // CLI flags win over both
    if let Some(level) = &cli.log_level {
        match LogLevel::parse(level) {
            Some(level) => config.diagnostics.level = level,
            None => warn!("Invalid log level '{}', using default", level),
        }
    }
    if let Some(format) = &cli.log_format {
        match LogFormat::parse(format) {
            Some(format) => config.diagnostics.format = format,
            None => warn!("Invalid log format '{}', using default", format),
        }
    }

    config
        .validate()
        .context("Invalid telemetry configuration")?;

    Ok(config)
}

async fn serve(config: TelemetryConfig, bind: SocketAddr) -> Result<()> {
    let telemetry =
        Telemetry::from_config(config).context("Failed to build telemetry pipeline")?;
    telemetry
        .start()
        .context("Failed to start metrics scheduler")?;

    let routes = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }));
    let app = telemetry
        .instrument(routes)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(
        telemetry.event = "server_started",
        address = %bind,
        "Serving instrumented endpoints"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

async fn read_document(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

fn sanitize_document(config: &TelemetryConfig, input: &str) -> Result<String> {
    let document: Value = serde_json::from_str(input).context("Input is not valid JSON")?;
    let sanitizer = Sanitizer::from_config(&config.privacy)?;
    Ok(serde_json::to_string_pretty(
        &sanitizer.sanitize_json(&document),
    )?)
}

async fn flush(config: &TelemetryConfig, dry_run: bool) -> Result<()> {
    let batch = MetricsAggregator::new(&config.metrics).flush();

    if dry_run {
        let body = serde_json::to_string_pretty(&MetricPushBody::from(&batch))?;
        println!("{}", body);
        return Ok(());
    }

    let collector = HttpCollector::new(config)?;
    collector
        .deliver_metrics(&batch)
        .await
        .context("Metric push failed")?;
    info!(
        telemetry.event = "metrics_pushed",
        samples = batch.len(),
        "Metrics batch delivered"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before parsing configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = create_telemetry_config(&cli).await?;
    let _telemetry_guard = TelemetrySystem::init_diagnostics(&config.diagnostics)
        .map_err(|e| anyhow::anyhow!("Telemetry initialization failed: {}", e))?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Sanitize { file } => {
            let input = read_document(file.as_deref()).await?;
            println!("{}", sanitize_document(&config, &input)?);
            Ok(())
        }
        Command::Flush { dry_run } => flush(&config, dry_run).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "pizza-telemetry",
            "--log-level",
            "debug",
            "serve",
            "--bind",
            "0.0.0.0:8080",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Serve { bind } if bind.port() == 8080));

        let cli = Cli::parse_from(["pizza-telemetry", "flush", "--dry-run"]);
        assert!(matches!(cli.command, Command::Flush { dry_run: true }));
    }

    #[tokio::test]
    async fn test_cli_flags_override_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("telemetry.toml");
        tokio::fs::write(&path, "[diagnostics]\nlevel = \"Warn\"\nformat = \"Json\"\n")
            .await
            .unwrap();

        let cli = Cli::parse_from([
            "pizza-telemetry",
            "--config",
            path.to_str().unwrap(),
            "--log-format",
            "pretty",
            "sanitize",
        ]);
        let config = create_telemetry_config(&cli).await.unwrap();

        assert_eq!(config.diagnostics.format, LogFormat::Pretty);
        if std::env::var("PIZZA_LOG_LEVEL").is_err() {
            assert_eq!(config.diagnostics.level, LogLevel::Warn);
        }
    }

    #[test]
    fn test_sanitize_document() {
        let output = sanitize_document(
            &TelemetryConfig::default(),
            r#"{"email":"d@jwt.com","auth":{"apiKey":"abc"}}"#,
        )
        .unwrap();
        let output: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(output["email"], "d@jwt.com");
        assert_eq!(output["auth"]["apiKey"], "*****");
        assert!(sanitize_document(&TelemetryConfig::default(), "not json").is_err());
    }
}
