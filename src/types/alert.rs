//! Alert event payload streamed to subscribers and returned to callers

use crate::types::score::ScoreResult;
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Probability band, independent of the factor-derived severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds
    pub fn from_score(score: f64, thresholds: &RiskLevelThresholds) -> Self {
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Configurable probability band thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.6,
            critical: 0.8,
        }
    }
}

/// A scored transaction as delivered to the caller and to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique event identifier
    pub event_id: String,

    /// Event generation timestamp
    pub timestamp: DateTime<Utc>,

    /// Probability rounded to three decimals for display
    pub fraud_score: f64,

    /// Probability band
    pub score_band: RiskLevel,

    /// Operator-facing reason: explanation plus primary factor
    pub reason: String,

    pub location: String,

    /// Full classification and rationale
    pub result: ScoreResult,

    /// The transaction that was scored
    pub transaction: Transaction,
}

impl AlertEvent {
    /// Build the event for a finished scoring cycle
    pub fn new(
        transaction: Transaction,
        result: ScoreResult,
        thresholds: &RiskLevelThresholds,
    ) -> Self {
        let reason = match result.primary_reason() {
            Some(primary) => format!("{}\n{}", result.explanation, primary),
            None => result.explanation.clone(),
        };

        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            fraud_score: (result.probability * 1000.0).round() / 1000.0,
            score_band: RiskLevel::from_score(result.probability, thresholds),
            reason,
            location: transaction.location_label().to_string(),
            result,
            transaction,
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.result.is_flagged
    }
}
