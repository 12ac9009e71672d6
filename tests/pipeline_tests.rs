//! End-to-end tests for the ingestion pipeline
//!
//! These build the gate, score backend and bus from configuration the way
//! the binary does and drive requests through the public API.

use fraud_shield::bus::{ChannelSink, Frame};
use fraud_shield::config::AppConfig;
use fraud_shield::gate::audit::FileAuditLog;
use fraud_shield::types::score::Severity;
use fraud_shield::{
    AccessGate, AlertBus, GateDenial, IngestionPipeline, Interest, PipelineError, ScoreBackend,
    Transaction,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

fn build(config: &AppConfig, audit_path: &std::path::Path) -> Arc<IngestionPipeline> {
    let audit = Arc::new(FileAuditLog::open(audit_path).unwrap());
    let gate = Arc::new(AccessGate::from_config(&config.gate, audit).unwrap());
    let backend = ScoreBackend::from_config(config).unwrap();
    Arc::new(
        IngestionPipeline::new(gate, Arc::new(backend), Arc::new(AlertBus::new()))
            .with_threshold(config.detection.threshold)
            .with_score_bands(config.detection.score_bands.clone()),
    )
}

#[tokio::test]
async fn test_configured_pipeline_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        &dir,
        r#"
[gate]
whitelist = ["10.0.0.0/8"]
blacklist = ["203.0.113.0/24", "10.9.0.0/16"]

[gate.rate_limit]
requests = 2
window_seconds = 60

[detection]
threshold = 0.6
"#,
    );
    let config = AppConfig::load_from_path(&config_path).unwrap();
    let audit_path = dir.path().join("audit.csv");
    let pipeline = build(&config, &audit_path);

    // 0.25 + 0.2 + 0.1 + 0.1 = 0.65 > 0.6
    let event = pipeline
        .handle("192.0.2.10", Transaction::new(3000.0, 22, 3.0, 150.0))
        .await
        .unwrap();
    assert!(event.is_flagged());
    assert_eq!(event.fraud_score, 0.65);
    // amount HIGH(3) + timing HIGH(3) + velocity LOW(1) + geography MEDIUM(2) = 9
    assert_eq!(event.result.severity, Severity::High);
    assert_eq!(event.result.recommendation, "MANUAL REVIEW REQUIRED");

    let event = pipeline
        .handle("192.0.2.10", Transaction::new(50.0, 14, 0.5, 5.0))
        .await
        .unwrap();
    assert!(!event.is_flagged());

    let err = pipeline
        .handle("192.0.2.10", Transaction::new(50.0, 14, 0.5, 5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Denied(GateDenial::RateLimited { .. })));

    // whitelist wins over the overlapping blacklist entry
    for _ in 0..5 {
        pipeline
            .handle("10.9.1.1", Transaction::new(50.0, 14, 0.5, 5.0))
            .await
            .unwrap();
    }

    let err = pipeline
        .handle("not-an-ip", Transaction::new(50.0, 14, 0.5, 5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Denied(GateDenial::Blacklisted(_))));

    let audit = std::fs::read_to_string(&audit_path).unwrap();
    let mut lines = audit.lines();
    assert_eq!(lines.next(), Some("timestamp,ip_address,status,details"));
    // one record per decision
    assert_eq!(lines.count(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_respect_budget() {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.gate.rate_limit.requests = 50;
    let pipeline = build(&config, &dir.path().join("audit.csv"));

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .handle("198.51.100.20", Transaction::new(50.0, 14, 0.5, 5.0))
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 50);
    assert_eq!(pipeline.metrics().denials().get("rate_limited"), Some(&150));
}

#[tokio::test]
async fn test_disconnected_subscriber_is_pruned_silently() {
    let dir = TempDir::new().unwrap();
    let pipeline = build(&AppConfig::default(), &dir.path().join("audit.csv"));
    let bus = pipeline.bus();

    let (live, mut live_rx) = ChannelSink::channel(8, Duration::from_millis(50));
    let (gone, gone_rx) = ChannelSink::channel(8, Duration::from_millis(50));
    bus.subscribe(Interest::All, Arc::new(live));
    bus.subscribe(Interest::All, Arc::new(gone));
    drop(gone_rx);

    let event = pipeline
        .handle("192.0.2.1", Transaction::new(8000.0, 2, 13.0, 1100.0))
        .await
        .unwrap();
    assert_eq!(bus.subscriber_count(Interest::All), 1);

    match live_rx.recv().await {
        Some(Frame::Event(received)) => assert_eq!(received.event_id, event.event_id),
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[cfg(not(feature = "onnx"))]
#[tokio::test]
async fn test_model_provider_without_classifier_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        &dir,
        r#"
[detection]
provider = "model"
"#,
    );
    let config = AppConfig::load_from_path(&config_path).unwrap();
    let pipeline = build(&config, &dir.path().join("audit.csv"));

    let err = pipeline
        .handle("192.0.2.1", Transaction::new(50.0, 14, 0.5, 5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ScoringUnavailable(_)));
    assert_eq!(pipeline.metrics().transactions_scored(), 0);
}
