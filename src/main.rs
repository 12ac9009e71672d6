//! Fraud Shield - Main Entry Point
//!
//! Serves transaction scoring over HTTP and streams scored events to
//! websocket subscribers.

use anyhow::{Context, Result};
use fraud_shield::{
    bus::AlertBus,
    config::{AppConfig, LoggingConfig},
    gate::{
        audit::{AuditSink, FileAuditLog, TracingAuditLog},
        rules::RuleSet,
        AccessGate, WindowSweeper,
    },
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ScoreBackend, ScoreProvider},
    pipeline::IngestionPipeline,
    server::{self, AppState},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Fraud Shield");
    info!(
        threshold = config.detection.threshold,
        provider = ?config.detection.provider,
        "Configuration loaded successfully"
    );

    let audit: Arc<dyn AuditSink> = match &config.gate.audit_log {
        Some(path) => Arc::new(FileAuditLog::open(path)?),
        None => Arc::new(TracingAuditLog),
    };
    let gate = Arc::new(
        AccessGate::from_config(&config.gate, audit).context("Invalid gate network rules")?,
    );

    let trusted_proxies = Arc::new(
        RuleSet::parse(&config.gate.trusted_proxies).context("Invalid gate.trusted_proxies")?,
    );
    if trusted_proxies.is_empty() {
        info!("No trusted proxies configured, callers are identified by peer address");
    }

    let backend = ScoreBackend::from_config(&config)?;
    if !backend.is_ready() {
        warn!(
            provider = backend.name(),
            "Score provider not ready, scoring requests will fail"
        );
    }

    let metrics = Arc::new(PipelineMetrics::new());
    let bus = Arc::new(AlertBus::new());
    let pipeline = Arc::new(
        IngestionPipeline::new(gate.clone(), Arc::new(backend), bus)
            .with_threshold(config.detection.threshold)
            .with_score_bands(config.detection.score_bands.clone())
            .with_metrics(metrics.clone()),
    );

    // Evict idle rate windows
    tokio::spawn(WindowSweeper::new(gate, config.gate.sweep_interval_seconds).start());

    // Start metrics reporter
    tokio::spawn(MetricsReporter::new(metrics.clone(), config.metrics.report_interval_seconds).start());

    let app = server::router(AppState {
        pipeline,
        bus_config: config.bus.clone(),
        trusted_proxies,
    });

    let bind_addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid server.bind_addr '{}'", config.server.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Print final summary
    info!("Fraud Shield shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid logging.level '{}'", logging.level))?,
    };

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
