//! Per-request orchestration: gate, score, explain, broadcast, respond.

use crate::bus::AlertBus;
use crate::error::PipelineError;
use crate::explainer::RiskExplainer;
use crate::gate::AccessGate;
use crate::metrics::PipelineMetrics;
use crate::models::ScoreProvider;
use crate::types::alert::{AlertEvent, RiskLevelThresholds};
use crate::types::transaction::Transaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Ingestion pipeline shared by every request handler.
///
/// A request either ends with a scored event that was also broadcast, or
/// with an error. Nothing is retried here.
pub struct IngestionPipeline {
    gate: Arc<AccessGate>,
    provider: Arc<dyn ScoreProvider>,
    explainer: RiskExplainer,
    bus: Arc<AlertBus>,
    metrics: Arc<PipelineMetrics>,
    /// f64 bits of the fraud threshold
    threshold: AtomicU64,
    score_bands: RiskLevelThresholds,
}

impl IngestionPipeline {
    pub fn new(gate: Arc<AccessGate>, provider: Arc<dyn ScoreProvider>, bus: Arc<AlertBus>) -> Self {
        Self {
            gate,
            provider,
            explainer: RiskExplainer::new(),
            bus,
            metrics: Arc::new(PipelineMetrics::new()),
            threshold: AtomicU64::new(DEFAULT_THRESHOLD.to_bits()),
            score_bands: RiskLevelThresholds::default(),
        }
    }

    pub fn with_threshold(self, threshold: f64) -> Self {
        self.set_threshold(threshold);
        self
    }

    pub fn with_score_bands(mut self, bands: RiskLevelThresholds) -> Self {
        self.score_bands = bands;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_explainer(mut self, explainer: RiskExplainer) -> Self {
        self.explainer = explainer;
        self
    }

    /// Run one scoring cycle for `identity`
    pub async fn handle(
        &self,
        identity: &str,
        tx: Transaction,
    ) -> Result<Arc<AlertEvent>, PipelineError> {
        let started = Instant::now();

        if let Err(denial) = self.gate.decide(identity).into_result() {
            self.metrics.record_denial(denial.tag());
            return Err(denial.into());
        }

        if let Err(e) = tx.validate() {
            debug!(identity = %identity, error = %e, "Rejected transaction");
            return Err(e.into());
        }

        let probability = self.score(&tx)?;
        let threshold = self.threshold();
        let is_flagged = probability > threshold;

        let result = self.explainer.explain(&tx, probability, is_flagged);
        let event = Arc::new(AlertEvent::new(tx, result, &self.score_bands));
        self.metrics.record_scored(started.elapsed(), probability);

        if is_flagged {
            self.metrics.record_flagged(event.result.severity.as_str());
            info!(
                event_id = %event.event_id,
                identity = %identity,
                fraud_score = event.fraud_score,
                severity = %event.result.severity,
                "Fraud detected"
            );
        } else {
            debug!(
                event_id = %event.event_id,
                identity = %identity,
                fraud_score = event.fraud_score,
                "Transaction approved"
            );
        }

        let report = self.bus.dispatch(Arc::clone(&event)).await;
        debug!(
            event_id = %event.event_id,
            delivered_all = report.all,
            delivered_fraud_only = report.fraud_only,
            "Event broadcast"
        );

        Ok(event)
    }

    fn score(&self, tx: &Transaction) -> Result<f64, PipelineError> {
        if !self.provider.is_ready() {
            self.metrics.record_scoring_failure();
            warn!(provider = self.provider.name(), "Score provider not ready");
            return Err(PipelineError::ScoringUnavailable(format!(
                "score provider '{}' is not ready",
                self.provider.name()
            )));
        }

        self.provider.score(tx).map_err(|e| {
            self.metrics.record_scoring_failure();
            warn!(provider = self.provider.name(), error = %e, "Scoring failed");
            PipelineError::from(e)
        })
    }

    pub fn threshold(&self) -> f64 {
        f64::from_bits(self.threshold.load(Ordering::Acquire))
    }

    /// Update the fraud threshold, clamped into [0, 1]. A non-finite value
    /// leaves the threshold unchanged and returns `None`.
    pub fn set_threshold(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            warn!(value = %value, "Rejected non-finite fraud threshold");
            return None;
        }
        let applied = value.clamp(0.0, 1.0);
        let previous = f64::from_bits(self.threshold.swap(applied.to_bits(), Ordering::AcqRel));
        info!(previous = previous, threshold = applied, "Fraud threshold updated");
        Some(applied)
    }

    pub fn gate(&self) -> &Arc<AccessGate> {
        &self.gate
    }

    pub fn bus(&self) -> &Arc<AlertBus> {
        &self.bus
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn score_bands(&self) -> &RiskLevelThresholds {
        &self.score_bands
    }
}
