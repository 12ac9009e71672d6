//! Type definitions for the fraud scoring core

pub mod alert;
pub mod score;
pub mod transaction;

pub use alert::{AlertEvent, RiskLevel, RiskLevelThresholds};
pub use score::{FactorCategory, FactorLevel, RiskFactor, ScoreResult, Severity};
pub use transaction::Transaction;
