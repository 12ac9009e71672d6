//! Performance metrics and statistics tracking for the ingestion pipeline.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Transactions scored (accepted by the gate and scored successfully)
    transactions_scored: AtomicU64,
    /// Transactions above the fraud threshold
    transactions_flagged: AtomicU64,
    /// Requests that failed in the score provider
    scoring_failures: AtomicU64,
    /// Gate denials by reason tag
    denials: RwLock<BTreeMap<&'static str, u64>>,
    /// Flagged events by severity label
    flagged_by_severity: RwLock<BTreeMap<&'static str, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            transactions_scored: AtomicU64::new(0),
            transactions_flagged: AtomicU64::new(0),
            scoring_failures: AtomicU64::new(0),
            denials: RwLock::new(BTreeMap::new()),
            flagged_by_severity: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored transaction
    pub fn record_scored(&self, processing_time: Duration, probability: f64) {
        self.transactions_scored.fetch_add(1, Ordering::Relaxed);

        {
            let mut times = self.processing_times.write();
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        self.score_buckets.write()[bucket] += 1;
    }

    pub fn record_flagged(&self, severity: &'static str) {
        self.transactions_flagged.fetch_add(1, Ordering::Relaxed);
        *self.flagged_by_severity.write().entry(severity).or_insert(0) += 1;
    }

    pub fn record_denial(&self, reason: &'static str) {
        *self.denials.write().entry(reason).or_insert(0) += 1;
    }

    pub fn record_scoring_failure(&self) {
        self.scoring_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transactions_scored(&self) -> u64 {
        self.transactions_scored.load(Ordering::Relaxed)
    }

    pub fn transactions_flagged(&self) -> u64 {
        self.transactions_flagged.load(Ordering::Relaxed)
    }

    pub fn scoring_failures(&self) -> u64 {
        self.scoring_failures.load(Ordering::Relaxed)
    }

    pub fn denials(&self) -> BTreeMap<&'static str, u64> {
        self.denials.read().clone()
    }

    /// Get processing time statistics
    pub fn processing_stats(&self) -> ProcessingStats {
        let mut sorted = self.processing_times.read().clone();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Current throughput (transactions per second)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            transactions_scored: self.transactions_scored(),
            transactions_flagged: self.transactions_flagged(),
            scoring_failures: self.scoring_failures(),
            denials: self.denials(),
            flagged_by_severity: self.flagged_by_severity.read().clone(),
            score_distribution: self.score_distribution(),
            processing: self.processing_stats(),
            throughput: self.throughput(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let summary = self.summary();
        let flag_rate = if summary.transactions_scored > 0 {
            (summary.transactions_flagged as f64 / summary.transactions_scored as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              FRAUD SHIELD - METRICS SUMMARY                  ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Scored: {:>8}  │  Throughput: {:>6.1} tx/s    ║",
            summary.transactions_scored, summary.throughput
        );
        info!(
            "║ Flagged:             {:>8}  │  Flag Rate:  {:>6.1}%        ║",
            summary.transactions_flagged, flag_rate
        );
        info!(
            "║ Scoring Failures:    {:>8}                                ║",
            summary.scoring_failures
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            summary.processing.mean_us,
            summary.processing.p50_us,
            summary.processing.p95_us,
            summary.processing.p99_us
        );
        if !summary.denials.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Gate Denials:                                                ║");
            for (reason, count) in &summary.denials {
                info!("║   {:14}: {:>6}", reason, count);
            }
        }
        if !summary.flagged_by_severity.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Flagged by Severity:                                         ║");
            for (severity, count) in &summary.flagged_by_severity {
                info!("║   {:14}: {:>6}", severity, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let total: u64 = summary.score_distribution.iter().sum();
        for (i, &count) in summary.score_distribution.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Point-in-time snapshot for reporting and the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub transactions_scored: u64,
    pub transactions_flagged: u64,
    pub scoring_failures: u64,
    pub denials: BTreeMap<&'static str, u64>,
    pub flagged_by_severity: BTreeMap<&'static str, u64>,
    pub score_distribution: [u64; 10],
    pub processing: ProcessingStats,
    pub throughput: f64,
    pub uptime_seconds: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_scored(Duration::from_micros(100), 0.05);
        metrics.record_scored(Duration::from_micros(300), 1.0);
        metrics.record_flagged("CRITICAL");
        metrics.record_denial("rate_limited");
        metrics.record_denial("rate_limited");
        metrics.record_denial("blacklisted");
        metrics.record_scoring_failure();

        assert_eq!(metrics.transactions_scored(), 2);
        assert_eq!(metrics.transactions_flagged(), 1);
        assert_eq!(metrics.scoring_failures(), 1);
        assert_eq!(metrics.denials().get("rate_limited"), Some(&2));
        assert_eq!(metrics.denials().get("blacklisted"), Some(&1));

        let dist = metrics.score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.processing_stats().count, 0);

        for us in 1..=100 {
            metrics.record_scored(Duration::from_micros(us), 0.0);
        }
        let stats = metrics.processing_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
    }

    #[test]
    fn test_summary_serializes() {
        let metrics = PipelineMetrics::new();
        metrics.record_flagged("HIGH");
        let value = serde_json::to_value(metrics.summary()).unwrap();
        assert_eq!(value["transactions_flagged"], serde_json::json!(1));
        assert_eq!(value["flagged_by_severity"]["HIGH"], serde_json::json!(1));
    }
}
