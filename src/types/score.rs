//! Scoring outcome and risk rationale structures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction attribute a risk factor was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorCategory {
    Amount,
    Timing,
    Velocity,
    Geography,
}

impl FactorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorCategory::Amount => "amount",
            FactorCategory::Timing => "timing",
            FactorCategory::Velocity => "velocity",
            FactorCategory::Geography => "geography",
        }
    }
}

impl fmt::Display for FactorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength of a single risk factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FactorLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl FactorLevel {
    /// Integer weight the level contributes to the severity sum
    pub fn weight(&self) -> u32 {
        match self {
            FactorLevel::Low => 1,
            FactorLevel::Medium => 2,
            FactorLevel::High => 3,
            FactorLevel::Extreme => 4,
        }
    }
}

/// One contributing reason behind a flagged transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: FactorCategory,
    pub level: FactorLevel,
    pub weight: u32,
    pub description: String,
    pub context: String,
}

impl RiskFactor {
    pub fn new(
        category: FactorCategory,
        level: FactorLevel,
        description: String,
        context: &str,
    ) -> Self {
        Self {
            category,
            level,
            weight: level.weight(),
            description,
            context: context.to_string(),
        }
    }
}

/// Aggregate severity tier derived from the summed factor weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "LOW-MEDIUM")]
    LowMedium,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl Severity {
    /// Tier for a flagged transaction given its total factor weight
    pub fn from_weight_sum(total: u32) -> Self {
        if total >= 12 {
            Severity::Critical
        } else if total >= 9 {
            Severity::High
        } else if total >= 6 {
            Severity::Medium
        } else {
            Severity::LowMedium
        }
    }

    /// Action recommended to the operator for this tier
    pub fn recommendation(&self) -> &'static str {
        match self {
            Severity::Critical => "BLOCK IMMEDIATELY",
            Severity::High => "MANUAL REVIEW REQUIRED",
            Severity::Medium => "ENHANCED MONITORING",
            Severity::LowMedium => "STANDARD MONITORING",
            Severity::Low => "Approve with standard monitoring.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::LowMedium => "LOW-MEDIUM",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification plus explanation for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Fraud probability (0.0 - 1.0)
    pub probability: f64,
    pub severity: Severity,
    pub is_flagged: bool,
    /// Fired factors in evaluation order: amount, timing, velocity, geography
    pub factors: Vec<RiskFactor>,
    pub primary_factor: Option<RiskFactor>,
    pub recommendation: String,
    pub confidence: String,
    /// Short explanation shown to operators
    pub explanation: String,
    pub detailed_analysis: String,
    pub factors_analyzed: usize,
}

impl ScoreResult {
    /// Sum of all factor weights
    pub fn total_weight(&self) -> u32 {
        self.factors.iter().map(|f| f.weight).sum()
    }

    /// Description of the primary factor, if any
    pub fn primary_reason(&self) -> Option<&str> {
        self.primary_factor.as_ref().map(|f| f.description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_tiers() {
        assert_eq!(Severity::from_weight_sum(16), Severity::Critical);
        assert_eq!(Severity::from_weight_sum(12), Severity::Critical);
        assert_eq!(Severity::from_weight_sum(11), Severity::High);
        assert_eq!(Severity::from_weight_sum(9), Severity::High);
        assert_eq!(Severity::from_weight_sum(6), Severity::Medium);
        assert_eq!(Severity::from_weight_sum(5), Severity::LowMedium);
        assert_eq!(Severity::from_weight_sum(0), Severity::LowMedium);
    }

    #[test]
    fn test_severity_serialization() {
        assert_eq!(
            serde_json::to_string(&Severity::LowMedium).unwrap(),
            "\"LOW-MEDIUM\""
        );
        let parsed: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(parsed, Severity::Critical);
        assert_eq!(parsed.recommendation(), "BLOCK IMMEDIATELY");
    }

    #[test]
    fn test_factor_weight_follows_level() {
        let factor = RiskFactor::new(
            FactorCategory::Velocity,
            FactorLevel::High,
            "High frequency (8 txns)".to_string(),
            "Clustering suggests fraud",
        );
        assert_eq!(factor.weight, 3);
        assert_eq!(
            serde_json::to_value(&factor).unwrap()["level"],
            serde_json::json!("HIGH")
        );
    }
}
