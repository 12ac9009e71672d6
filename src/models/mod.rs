//! Score providers: the capability that turns a transaction into a fraud
//! probability, and the interchangeable backends behind it.

pub mod classifier;
#[cfg(feature = "onnx")]
pub mod inference;
#[cfg(feature = "onnx")]
pub mod loader;
pub mod rules;

pub use classifier::{Classifier, ClassifierScorer};
pub use rules::RuleEngine;

use crate::config::{AppConfig, ScoreBackendKind};
use crate::error::ScoringError;
use crate::types::transaction::Transaction;
use anyhow::Result;
use tracing::info;

/// Maps a transaction to a fraud probability in [0, 1]
pub trait ScoreProvider: Send + Sync {
    /// Backend name for logs and stats
    fn name(&self) -> &str;

    /// Whether the provider can score right now
    fn is_ready(&self) -> bool {
        true
    }

    fn score(&self, tx: &Transaction) -> Result<f64, ScoringError>;
}

/// The backend selected at construction time
pub enum ScoreBackend {
    Rules(RuleEngine),
    Classifier(ClassifierScorer),
}

impl ScoreBackend {
    /// Build the configured backend
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = match config.detection.provider {
            ScoreBackendKind::Rules => ScoreBackend::Rules(RuleEngine::new()),
            ScoreBackendKind::Model => {
                ScoreBackend::Classifier(ClassifierScorer::from_config(&config.model)?)
            }
        };
        info!(provider = backend.name(), ready = backend.is_ready(), "Score provider initialized");
        Ok(backend)
    }
}

impl ScoreProvider for ScoreBackend {
    fn name(&self) -> &str {
        match self {
            ScoreBackend::Rules(engine) => engine.name(),
            ScoreBackend::Classifier(scorer) => scorer.name(),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            ScoreBackend::Rules(engine) => engine.is_ready(),
            ScoreBackend::Classifier(scorer) => scorer.is_ready(),
        }
    }

    fn score(&self, tx: &Transaction) -> Result<f64, ScoringError> {
        match self {
            ScoreBackend::Rules(engine) => engine.score(tx),
            ScoreBackend::Classifier(scorer) => scorer.score(tx),
        }
    }
}
