//! Deterministic weighted-threshold rule engine

use crate::error::ScoringError;
use crate::models::ScoreProvider;
use crate::types::transaction::Transaction;

/// Additive rule scoring. Each attribute contributes its highest matching
/// tier only; the sum is clamped to 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a transaction. Pure and deterministic.
    pub fn evaluate(&self, tx: &Transaction) -> f64 {
        let mut score = 0.0;

        if tx.amount > 5000.0 {
            score += 0.4;
        } else if tx.amount > 2000.0 {
            score += 0.25;
        } else if tx.amount > 1000.0 {
            score += 0.15;
        }

        match tx.hour_of_day {
            0..=5 => score += 0.3,
            21..=23 => score += 0.2,
            _ => {}
        }

        if tx.velocity > 10.0 {
            score += 0.35;
        } else if tx.velocity > 5.0 {
            score += 0.2;
        } else if tx.velocity > 2.0 {
            score += 0.1;
        }

        if tx.geo_distance > 1000.0 {
            score += 0.3;
        } else if tx.geo_distance > 500.0 {
            score += 0.2;
        } else if tx.geo_distance > 100.0 {
            score += 0.1;
        }

        f64::min(score, 1.0)
    }
}

impl ScoreProvider for RuleEngine {
    fn name(&self) -> &str {
        "rules"
    }

    fn score(&self, tx: &Transaction) -> Result<f64, ScoringError> {
        Ok(self.evaluate(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(amount: f64, hour: u8, velocity: f64, geo: f64) -> f64 {
        RuleEngine::new().evaluate(&Transaction::new(amount, hour, velocity, geo))
    }

    #[test]
    fn test_benign_transaction_scores_zero() {
        assert_eq!(score(50.0, 14, 0.5, 5.0), 0.0);
    }

    #[test]
    fn test_tiers_are_exclusive() {
        assert_eq!(score(1000.0, 12, 0.0, 0.0), 0.0);
        assert_eq!(score(1000.01, 12, 0.0, 0.0), 0.15);
        assert_eq!(score(2500.0, 12, 0.0, 0.0), 0.25);
        assert_eq!(score(9000.0, 12, 0.0, 0.0), 0.4);
        assert_eq!(score(0.0, 12, 11.0, 0.0), 0.35);
        assert_eq!(score(0.0, 12, 0.0, 600.0), 0.2);
    }

    #[test]
    fn test_hour_buckets() {
        assert_eq!(score(0.0, 0, 0.0, 0.0), 0.3);
        assert_eq!(score(0.0, 5, 0.0, 0.0), 0.3);
        assert_eq!(score(0.0, 6, 0.0, 0.0), 0.0);
        assert_eq!(score(0.0, 20, 0.0, 0.0), 0.0);
        assert_eq!(score(0.0, 21, 0.0, 0.0), 0.2);
        assert_eq!(score(0.0, 23, 0.0, 0.0), 0.2);
    }

    #[test]
    fn test_accumulation_is_left_to_right() {
        // 0.25 + 0.2 + 0.1 + 0.1 accumulated left to right
        let expected = 0.0 + 0.25 + 0.2 + 0.1 + 0.1;
        assert_eq!(score(3000.0, 22, 3.0, 150.0), expected);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(score(8000.0, 2, 13.0, 1100.0), 1.0);
    }

    #[test]
    fn test_monotonic_in_numeric_inputs() {
        let steps = [0.0, 50.0, 100.0, 100.5, 500.0, 501.0, 1000.0, 1001.0, 2001.0, 5001.0, 1e6];
        for hour in [3u8, 12, 22] {
            let mut last = (0.0, 0.0, 0.0);
            for &v in &steps {
                let by_amount = score(v, hour, 1.0, 10.0);
                let by_velocity = score(100.0, hour, v / 100.0, 10.0);
                let by_geo = score(100.0, hour, 1.0, v);
                assert!(by_amount >= last.0);
                assert!(by_velocity >= last.1);
                assert!(by_geo >= last.2);
                for s in [by_amount, by_velocity, by_geo] {
                    assert!((0.0..=1.0).contains(&s));
                }
                last = (by_amount, by_velocity, by_geo);
            }
        }
    }
}
