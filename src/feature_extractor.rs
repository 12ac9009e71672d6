//! Feature extraction for classifier inference.
//!
//! Produces the four-feature vector the classifier was trained on, in the
//! exact training column order, optionally standardized with the training
//! scaler's parameters.

use crate::config::ScalerConfig;
use crate::types::transaction::Transaction;
use anyhow::{ensure, Result};

/// Number of features in the model input
pub const FEATURE_COUNT: usize = 4;

/// Standard-scaler parameters: `(x - mean) / scale` per feature
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    pub fn new(mean: [f64; FEATURE_COUNT], scale: [f64; FEATURE_COUNT]) -> Self {
        Self { mean, scale }
    }

    /// Build from configuration, checking dimensions
    pub fn from_config(config: &ScalerConfig) -> Result<Self> {
        ensure!(
            config.mean.len() == FEATURE_COUNT && config.scale.len() == FEATURE_COUNT,
            "scaler needs {} means and scales, got {} and {}",
            FEATURE_COUNT,
            config.mean.len(),
            config.scale.len()
        );
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];
        mean.copy_from_slice(&config.mean);
        scale.copy_from_slice(&config.scale);
        Ok(Self::new(mean, scale))
    }

    fn apply(&self, index: usize, value: f64) -> f64 {
        let scale = self.scale[index];
        // a zero-variance column is centred only
        if scale == 0.0 {
            value - self.mean[index]
        } else {
            (value - self.mean[index]) / scale
        }
    }
}

/// Transforms transactions into model input features
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    scaler: Option<StandardScaler>,
}

impl FeatureExtractor {
    /// Extractor producing raw (unscaled) features
    pub fn new() -> Self {
        Self { scaler: None }
    }

    /// Extractor standardizing features with the training scaler
    pub fn with_scaler(scaler: StandardScaler) -> Self {
        Self {
            scaler: Some(scaler),
        }
    }

    /// Raw attribute values in training order
    pub fn raw(&self, tx: &Transaction) -> [f64; FEATURE_COUNT] {
        [
            tx.amount,
            tx.hour_of_day as f64,
            tx.velocity,
            tx.geo_distance,
        ]
    }

    /// Extract the model input vector
    pub fn extract(&self, tx: &Transaction) -> Vec<f32> {
        let raw = self.raw(tx);
        raw.iter()
            .enumerate()
            .map(|(i, &value)| match &self.scaler {
                Some(scaler) => scaler.apply(i, value) as f32,
                None => value as f32,
            })
            .collect()
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Feature names (matching training column order)
    pub fn feature_names(&self) -> [&'static str; FEATURE_COUNT] {
        ["amount", "hour_of_day", "velocity", "geo_distance"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let tx = Transaction::new(250.0, 22, 3.0, 120.0);

        let features = extractor.extract(&tx);
        assert_eq!(features.len(), extractor.feature_count());
        assert_eq!(features, vec![250.0, 22.0, 3.0, 120.0]);
        assert_eq!(extractor.feature_names()[3], "geo_distance");
    }

    #[test]
    fn test_scaled_feature_extraction() {
        let scaler = StandardScaler::new([100.0, 12.0, 1.0, 50.0], [50.0, 6.0, 0.0, 25.0]);
        let extractor = FeatureExtractor::with_scaler(scaler);
        let tx = Transaction::new(200.0, 18, 3.0, 100.0);

        let features = extractor.extract(&tx);
        assert_eq!(features, vec![2.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_scaler_from_config_checks_dimensions() {
        let bad = ScalerConfig {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        assert!(StandardScaler::from_config(&bad).is_err());

        let good = ScalerConfig {
            mean: vec![0.0; 4],
            scale: vec![1.0; 4],
        };
        assert!(StandardScaler::from_config(&good).is_ok());
    }
}
