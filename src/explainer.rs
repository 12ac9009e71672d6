//! Risk explanation: turns a transaction and its fraud probability into
//! ranked risk factors, a severity tier and a recommended action.

use crate::types::score::{FactorCategory, FactorLevel, RiskFactor, ScoreResult, Severity};
use crate::types::transaction::Transaction;

const BENIGN_EXPLANATION: &str = "Transaction appears legitimate.";
const BENIGN_ANALYSIS: &str = "All parameters within normal ranges.";
const NO_FACTOR_EXPLANATION: &str = "No individual risk factor exceeded its threshold.";

/// Four ascending cut-offs mapped to LOW / MEDIUM / HIGH / EXTREME
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub extreme: f64,
}

impl FactorThresholds {
    pub const fn new(low: f64, medium: f64, high: f64, extreme: f64) -> Self {
        Self {
            low,
            medium,
            high,
            extreme,
        }
    }

    /// Highest level whose cut-off `value` reaches
    pub fn level_for(&self, value: f64) -> Option<FactorLevel> {
        if value >= self.extreme {
            Some(FactorLevel::Extreme)
        } else if value >= self.high {
            Some(FactorLevel::High)
        } else if value >= self.medium {
            Some(FactorLevel::Medium)
        } else if value >= self.low {
            Some(FactorLevel::Low)
        } else {
            None
        }
    }
}

/// Cut-offs for each numeric category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplainerThresholds {
    pub amount: FactorThresholds,
    pub velocity: FactorThresholds,
    /// Kilometers
    pub geo_distance: FactorThresholds,
}

impl Default for ExplainerThresholds {
    fn default() -> Self {
        Self {
            amount: FactorThresholds::new(500.0, 1500.0, 3000.0, 7000.0),
            velocity: FactorThresholds::new(2.0, 4.0, 7.0, 12.0),
            geo_distance: FactorThresholds::new(50.0, 150.0, 500.0, 1000.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskExplainer {
    thresholds: ExplainerThresholds,
}

impl RiskExplainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: ExplainerThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate every category in fixed order: amount, timing, velocity, geography
    pub fn analyze_factors(&self, tx: &Transaction) -> Vec<RiskFactor> {
        [
            self.amount_factor(tx.amount),
            timing_factor(tx.hour_of_day),
            self.velocity_factor(tx.velocity),
            self.geography_factor(tx.geo_distance),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Build the full result for a scored transaction
    pub fn explain(&self, tx: &Transaction, probability: f64, is_flagged: bool) -> ScoreResult {
        if !is_flagged {
            return ScoreResult {
                probability,
                severity: Severity::Low,
                is_flagged: false,
                factors: Vec::new(),
                primary_factor: None,
                recommendation: Severity::Low.recommendation().to_string(),
                confidence: percent(1.0 - probability),
                explanation: BENIGN_EXPLANATION.to_string(),
                detailed_analysis: BENIGN_ANALYSIS.to_string(),
                factors_analyzed: 0,
            };
        }

        let factors = self.analyze_factors(tx);
        let total: u32 = factors.iter().map(|f| f.weight).sum();
        let severity = Severity::from_weight_sum(total);

        // first maximum wins, so ties resolve in evaluation order
        let primary_factor = factors
            .iter()
            .fold(None::<&RiskFactor>, |best, f| match best {
                Some(b) if b.weight >= f.weight => Some(b),
                _ => Some(f),
            })
            .cloned();

        let detailed_analysis = if factors.is_empty() {
            NO_FACTOR_EXPLANATION.to_string()
        } else {
            factors
                .iter()
                .map(|f| f.description.as_str())
                .collect::<Vec<_>>()
                .join(" & ")
        };

        ScoreResult {
            probability,
            severity,
            is_flagged: true,
            factors_analyzed: factors.len(),
            primary_factor,
            recommendation: severity.recommendation().to_string(),
            confidence: percent(probability),
            explanation: detailed_analysis.clone(),
            detailed_analysis,
            factors,
        }
    }

    fn amount_factor(&self, amount: f64) -> Option<RiskFactor> {
        let level = self.thresholds.amount.level_for(amount)?;
        let money = format_currency(amount);
        let (description, context) = match level {
            FactorLevel::Extreme => (
                format!("Extremely high amount ({})", money),
                "Amounts over $7,000 are high fraud risk",
            ),
            FactorLevel::High => (
                format!("Large transaction ({})", money),
                "Large amounts may indicate fraud",
            ),
            FactorLevel::Medium => (
                format!("Elevated amount ({})", money),
                "Above-average amounts require review",
            ),
            FactorLevel::Low => (
                format!("Moderately high amount ({})", money),
                "Slightly elevated amount",
            ),
        };
        Some(RiskFactor::new(FactorCategory::Amount, level, description, context))
    }

    fn velocity_factor(&self, velocity: f64) -> Option<RiskFactor> {
        let level = self.thresholds.velocity.level_for(velocity)?;
        let count = velocity.trunc() as i64;
        let (description, context) = match level {
            FactorLevel::Extreme => (
                format!("Very high frequency ({} txns)", count),
                "Automated/bot activity likely",
            ),
            FactorLevel::High => (
                format!("High frequency ({} txns)", count),
                "Clustering suggests fraud",
            ),
            FactorLevel::Medium => (
                format!("Elevated frequency ({} txns)", count),
                "Above normal pace",
            ),
            FactorLevel::Low => (
                format!("Moderate frequency ({} txns)", count),
                "Slightly elevated",
            ),
        };
        Some(RiskFactor::new(FactorCategory::Velocity, level, description, context))
    }

    fn geography_factor(&self, distance: f64) -> Option<RiskFactor> {
        let level = self.thresholds.geo_distance.level_for(distance)?;
        let (description, context) = match level {
            FactorLevel::Extreme => (
                format!("Cross-country ({:.0}km)", distance),
                "Stolen credentials likely",
            ),
            FactorLevel::High => (
                format!("Long distance ({:.0}km)", distance),
                "Location anomaly",
            ),
            FactorLevel::Medium => (
                format!("Unusual distance ({:.0}km)", distance),
                "Outside typical range",
            ),
            FactorLevel::Low => (
                format!("Moderate distance ({:.0}km)", distance),
                "Slightly outside normal",
            ),
        };
        Some(RiskFactor::new(FactorCategory::Geography, level, description, context))
    }
}

/// Fixed hour buckets: 0-5 extreme, 21-23 and 6-7 high, 8 and 18-20 medium, 9-17 none
fn timing_factor(hour: u8) -> Option<RiskFactor> {
    let (level, description, context) = match hour {
        0..=5 => (
            FactorLevel::Extreme,
            format!("Transaction at {}:00", hour),
            "Midnight–6AM has very high fraud rates",
        ),
        6 | 7 | 21..=23 => (
            FactorLevel::High,
            format!("Late evening at {}:00", hour),
            "Evening transactions often flagged",
        ),
        8 | 18..=20 => (
            FactorLevel::Medium,
            format!("Off-business hours at {}:00", hour),
            "Outside 9–5 needs scrutiny",
        ),
        _ => return None,
    };
    Some(RiskFactor::new(FactorCategory::Timing, level, description, context))
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// `$1,234.56` style formatting
fn format_currency(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}
