//! ONNX Runtime classifier backend

use crate::config::ModelConfig;
use crate::models::classifier::Classifier;
use crate::models::loader::{LoadedModel, ModelLoader};
use anyhow::{anyhow, Context, Result};
use ort::memory::Allocator;
use ort::value::{DynMapValueType, DynSequenceValueType, DowncastableTarget, Tensor};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Binary classifier exported to ONNX (e.g. a gradient-boosted model trained on
/// amount, hour, velocity and distance). Sessions need exclusive access to run.
pub struct OnnxClassifier {
    name: String,
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let loader = ModelLoader::with_threads(config.threads);
        let model = loader.load_model(&config.path, config.input_name.as_deref())?;
        Ok(Self {
            name: model.name.clone(),
            model: Mutex::new(model),
        })
    }

    fn run(&self, features: &[f32]) -> Result<f64> {
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .context("Failed to create input tensor")?;

        let mut model = self.model.lock();
        let input_name = model.input_name.clone();
        let output_name = model.output_name.clone();
        let outputs = model
            .session
            .run(ort::inputs![input_name.as_str() => input_tensor])?;

        if let Some(output) = outputs.get(output_name.as_str()) {
            if let Some(prob) = extract_probability(&output, &self.name) {
                return Ok(prob);
            }
        }

        // fall back to any non-label output
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = extract_probability(&output, &self.name) {
                debug!(model = %self.name, output = %name, "Extracted from fallback output");
                return Ok(prob);
            }
        }

        Err(anyhow!("no probability output found"))
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        self.run(features).map_err(|e| {
            warn!(model = %self.name, error = %e, "Classifier inference failed");
            e
        })
    }
}

/// Tensor outputs (`[batch, classes]`) or seq(map(int64, float)) outputs
/// as produced by boosted-tree exporters
fn extract_probability(output: &ort::value::DynValue, model_name: &str) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let classes = dims.last().copied().unwrap_or(1);
        let prob = if classes >= 2 {
            data.get(1).copied()
        } else {
            data.first().copied()
        };
        debug!(model = %model_name, prob = ?prob, "Extracted from tensor");
        return prob.map(|p| p as f64);
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return extract_from_sequence_map(output).ok();
    }
    None
}

fn extract_from_sequence_map(output: &ort::value::DynValue) -> Result<f64> {
    let allocator = Allocator::default();
    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;
    let pairs = first.try_extract_key_values::<i64, f32>()?;

    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(*prob as f64);
    }
    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *prob as f64);
    }
    Err(anyhow!("No probability found in map"))
}
