use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tract_onnx::prelude::*;

use crate::models::{FeatureSchema, PredictError, StartupError, FEATURE_NAMES};

const MODEL_VERSION: &str = "1.0.0";

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Hard label plus the probability mass on the churn class. Produced once per
/// request, consumed once, never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub label: u8,
    pub probability: f64,
}

/// Wraps the exported classifier artifact. Loaded once at startup and shared
/// read-only across workers for the process lifetime.
pub struct ChurnModel {
    plan: OnnxPlan,
    threshold: f32,
    input_len: usize,
}

impl ChurnModel {
    pub fn load<P: AsRef<Path>>(model_path: P, threshold: f32) -> Result<Self, StartupError> {
        let path = model_path.as_ref();
        let plan = build_plan(path, FEATURE_NAMES.len()).map_err(|e| StartupError::Model {
            path: path.display().to_string(),
            detail: format!("{e:#}"),
        })?;

        Ok(Self {
            plan,
            threshold,
            input_len: FEATURE_NAMES.len(),
        })
    }

    /// Runs the classifier on one customer vector. The exported booster emits
    /// the raw margin for the churn class; the sigmoid turns it into the
    /// probability the decision logic consumes.
    pub fn predict(&self, features: &[f64]) -> Result<ModelOutput, PredictError> {
        let values: Vec<f32> = features.iter().map(|v| *v as f32).collect();
        let tensor = Tensor::from_shape(&[1, self.input_len], &values)
            .map_err(|e| PredictError::Inference(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        let margin: f32 = *outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| PredictError::Inference(e.to_string()))?
            .iter()
            .next()
            .ok_or_else(|| PredictError::Inference("model produced no output".to_string()))?;

        let probability = 1.0 / (1.0 + (-margin).exp());
        Ok(ModelOutput {
            label: u8::from(probability >= self.threshold),
            probability: f64::from(probability),
        })
    }

    pub fn info(&self, schema: &FeatureSchema) -> ModelInfo {
        ModelInfo {
            input_shape: vec![1, self.input_len],
            threshold: self.threshold,
            version: MODEL_VERSION.to_string(),
            features: schema.names().to_vec(),
        }
    }
}

fn build_plan(path: &Path, input_len: usize) -> anyhow::Result<OnnxPlan> {
    Ok(tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, input_len)))?
        .into_optimized()?
        .into_runnable()?)
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub input_shape: Vec<usize>,
    pub threshold: f32,
    pub version: String,
    pub features: Vec<String>,
}

static PREDICTIONS_SERVED: AtomicU64 = AtomicU64::new(0);
static CHURN_FLAGGED: AtomicU64 = AtomicU64::new(0);
static PREDICTIONS_FAILED: AtomicU64 = AtomicU64::new(0);

/// Process-lifetime serving counters, snapshot by /api/stats.
#[derive(Debug, Serialize)]
pub struct ServingStats {
    pub predictions_served: u64,
    pub churn_flagged: u64,
    pub predictions_failed: u64,
}

pub fn record_prediction(label: u8) {
    PREDICTIONS_SERVED.fetch_add(1, Ordering::Relaxed);
    if label == 1 {
        CHURN_FLAGGED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_failure() {
    PREDICTIONS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn serving_stats() -> ServingStats {
    ServingStats {
        predictions_served: PREDICTIONS_SERVED.load(Ordering::Relaxed),
        churn_flagged: CHURN_FLAGGED.load(Ordering::Relaxed),
        predictions_failed: PREDICTIONS_FAILED.load(Ordering::Relaxed),
    }
}
