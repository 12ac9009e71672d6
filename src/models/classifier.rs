//! Adapter over an externally trained classifier

use crate::config::ModelConfig;
use crate::error::ScoringError;
use crate::feature_extractor::{FeatureExtractor, StandardScaler};
use crate::models::ScoreProvider;
use crate::types::transaction::Transaction;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// A trained model that returns the positive-class probability for a feature vector
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict_proba(&self, features: &[f32]) -> Result<f64>;
}

/// Scores transactions with a [`Classifier`]. With no classifier loaded,
/// every request fails as unavailable rather than being scored benign.
pub struct ClassifierScorer {
    extractor: FeatureExtractor,
    classifier: Option<Arc<dyn Classifier>>,
}

impl ClassifierScorer {
    pub fn new(extractor: FeatureExtractor, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            extractor,
            classifier: Some(classifier),
        }
    }

    /// Scorer without a model; reports not ready
    pub fn unavailable(extractor: FeatureExtractor) -> Self {
        Self {
            extractor,
            classifier: None,
        }
    }

    /// Build from configuration, loading the ONNX model when supported
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let extractor = match &config.scaler {
            Some(scaler) => FeatureExtractor::with_scaler(StandardScaler::from_config(scaler)?),
            None => FeatureExtractor::new(),
        };

        #[cfg(feature = "onnx")]
        {
            let classifier = crate::models::inference::OnnxClassifier::load(config)?;
            Ok(Self::new(extractor, Arc::new(classifier)))
        }

        #[cfg(not(feature = "onnx"))]
        {
            warn!(
                path = %config.path,
                "Built without the `onnx` feature, classifier unavailable"
            );
            Ok(Self::unavailable(extractor))
        }
    }
}

impl ScoreProvider for ClassifierScorer {
    fn name(&self) -> &str {
        self.classifier
            .as_ref()
            .map(|c| c.name())
            .unwrap_or("classifier")
    }

    fn is_ready(&self) -> bool {
        self.classifier.is_some()
    }

    fn score(&self, tx: &Transaction) -> Result<f64, ScoringError> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| ScoringError::Unavailable("classifier not loaded".to_string()))?;

        let features = self.extractor.extract(tx);
        let probability = classifier
            .predict_proba(&features)
            .map_err(ScoringError::Inference)?;

        if !probability.is_finite() {
            warn!(model = %classifier.name(), "Classifier returned a non-finite probability");
            return Err(ScoringError::Inference(anyhow!(
                "classifier returned {}",
                probability
            )));
        }

        debug!(model = %classifier.name(), probability = probability, "Classifier scored transaction");
        Ok(probability.clamp(0.0, 1.0))
    }
}
