// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Demand prediction adapter.
//!
//! The allocator only needs a number per request. Predictors report whether
//! that number came from a model or from the degraded-mode default, and never
//! fail the caller: every error is folded into [`Prediction::Fallback`].
//!
//! [`LinearDemandModel`] is the trainable implementation. Its parameters
//! (weights, bias and the normalization statistics fit at training time) are
//! persisted as JSON guarded by a CRC32 checksum.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, PredictionError};
use crate::features::FeatureRecord;

/// Demand returned whenever no model output is available.
pub const DEFAULT_DEMAND: f64 = 1.0;

/// Width of the fixed part of a feature vector: length + category one-hot.
const BASE_FEATURES: usize = 4;

/// Model file format version.
const MODEL_FORMAT_VERSION: u32 = 1;

/// Outcome of a demand prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// The model produced this demand.
    Model(f64),
    /// The model was unusable; `demand` is the configured default.
    Fallback { demand: f64, reason: PredictionError },
}

impl Prediction {
    pub fn demand(&self) -> f64 {
        match self {
            Self::Model(demand) => *demand,
            Self::Fallback { demand, .. } => *demand,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Predicts the resource cost of a request from its features.
pub trait DemandPredictor: Send + Sync {
    /// Raw model output, or the reason there is none.
    fn try_predict(&self, features: &FeatureRecord) -> Result<f64, PredictionError>;

    /// Demand used when `try_predict` fails.
    fn default_demand(&self) -> f64 {
        DEFAULT_DEMAND
    }

    /// Never-failing prediction used by the allocator.
    fn predict(&self, features: &FeatureRecord) -> Prediction {
        let outcome = self.try_predict(features).and_then(|value| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(PredictionError::NonFinite { value })
            }
        });

        match outcome {
            Ok(demand) => Prediction::Model(demand),
            Err(reason) => {
                let demand = self.default_demand();
                tracing::warn!(
                    reason = %reason,
                    default_demand = demand,
                    "Predictor degraded, using default demand"
                );
                Prediction::Fallback { demand, reason }
            }
        }
    }
}

/// Predictor that returns the same demand for every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDemand(pub f64);

impl DemandPredictor for FixedDemand {
    fn try_predict(&self, _features: &FeatureRecord) -> Result<f64, PredictionError> {
        Ok(self.0)
    }
}

/// Hyper-parameters for [`LinearDemandModel::train`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.05,
        }
    }
}

/// Summary of a finished training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: usize,
    pub embedding_width: usize,
    pub final_mse: f64,
}

/// Fitted parameters of a linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub embedding_width: usize,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl ModelParams {
    /// Expected feature vector width.
    pub fn input_width(&self) -> usize {
        BASE_FEATURES + self.embedding_width
    }

    fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&(self.embedding_width as u64).to_le_bytes());
        for series in [&self.weights, &self.mean, &self.std] {
            hasher.update(&(series.len() as u64).to_le_bytes());
            for value in series.iter() {
                hasher.update(&value.to_le_bytes());
            }
        }
        hasher.update(&self.bias.to_le_bytes());
        hasher.finalize()
    }

    fn validate(&self) -> Result<(), ModelError> {
        let width = self.input_width();
        for (name, len) in [
            ("weights", self.weights.len()),
            ("mean", self.mean.len()),
            ("std", self.std.len()),
        ] {
            if len != width {
                return Err(ModelError::Malformed {
                    reason: format!("{} has {} entries, expected {}", name, len, width),
                });
            }
        }

        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ModelError::Malformed {
                reason: "standard deviations must be positive".to_string(),
            });
        }

        Ok(())
    }

    fn evaluate(&self, raw: &[f64]) -> f64 {
        raw.iter()
            .zip(&self.mean)
            .zip(&self.std)
            .zip(&self.weights)
            .map(|(((x, mean), std), w)| (x - mean) / std * w)
            .sum::<f64>()
            + self.bias
    }
}

/// On-disk representation of a trained model.
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    version: u32,
    checksum: u32,
    params: ModelParams,
}

/// Linear regression over normalized request features.
#[derive(Debug, Clone)]
pub struct LinearDemandModel {
    params: Option<ModelParams>,
    default_demand: f64,
}

impl LinearDemandModel {
    /// Create an untrained model. Predictions fall back until `train` runs.
    pub fn untrained(default_demand: f64) -> Self {
        Self {
            params: None,
            default_demand,
        }
    }

    pub fn from_params(params: ModelParams, default_demand: f64) -> Result<Self, ModelError> {
        params.validate()?;
        Ok(Self {
            params: Some(params),
            default_demand,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.params.is_some()
    }

    pub fn params(&self) -> Option<&ModelParams> {
        self.params.as_ref()
    }

    /// Fit weights with batch gradient descent on mean squared error.
    ///
    /// Every row of `x` must have the same width of at least 4 (length plus
    /// the category one-hot); anything beyond is the embedding. Normalization
    /// statistics are computed once here, columns with zero variance keep a
    /// unit standard deviation.
    pub fn train(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        options: TrainingOptions,
    ) -> Result<TrainingReport, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ModelError::ShapeMismatch {
                reason: format!("{} feature rows but {} targets", x.len(), y.len()),
            });
        }

        let width = x[0].len();
        if width < BASE_FEATURES {
            return Err(ModelError::ShapeMismatch {
                reason: format!("rows need at least {} columns, got {}", BASE_FEATURES, width),
            });
        }

        for (row, (features, target)) in x.iter().zip(y).enumerate() {
            if features.len() != width {
                return Err(ModelError::ShapeMismatch {
                    reason: format!(
                        "row {} has {} columns, expected {}",
                        row,
                        features.len(),
                        width
                    ),
                });
            }
            if !target.is_finite() || features.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::NonFiniteInput { row });
            }
        }

        let n = x.len() as f64;
        let mut mean = vec![0.0; width];
        for row in x {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut std = vec![0.0; width];
        for row in x {
            for ((s, v), m) in std.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in std.iter_mut() {
            *s = s.sqrt();
            if *s <= f64::EPSILON {
                *s = 1.0;
            }
        }

        let normalized: Vec<Vec<f64>> = x
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&mean)
                    .zip(&std)
                    .map(|((v, m), s)| (v - m) / s)
                    .collect()
            })
            .collect();

        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        let mut mse = f64::NAN;

        for _ in 0..options.epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            let mut squared_error = 0.0;

            for (row, target) in normalized.iter().zip(y) {
                let predicted: f64 =
                    row.iter().zip(&weights).map(|(v, w)| v * w).sum::<f64>() + bias;
                let error = predicted - target;
                squared_error += error * error;
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += 2.0 * error * v / n;
                }
                grad_b += 2.0 * error / n;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= options.learning_rate * g;
            }
            bias -= options.learning_rate * grad_b;
            mse = squared_error / n;
        }

        let params = ModelParams {
            embedding_width: width - BASE_FEATURES,
            weights,
            bias,
            mean,
            std,
        };
        let final_mse = params_mse(&params, x, y);

        tracing::info!(
            samples = x.len(),
            epochs = options.epochs,
            last_epoch_mse = mse,
            final_mse,
            "Demand model trained"
        );

        let report = TrainingReport {
            samples: x.len(),
            epochs: options.epochs,
            embedding_width: params.embedding_width,
            final_mse,
        };
        self.params = Some(params);
        Ok(report)
    }

    /// Persist the trained parameters as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let params = self.params.as_ref().ok_or(ModelError::NotTrained)?;
        let file = ModelFile {
            version: MODEL_FORMAT_VERSION,
            checksum: params.checksum(),
            params: params.clone(),
        };

        let content = serde_json::to_string_pretty(&file).map_err(|e| ModelError::Malformed {
            reason: e.to_string(),
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| ModelError::Io {
            context: "writing model file",
            source: e,
        })
    }

    /// Load a model saved by [`LinearDemandModel::save`].
    pub fn load(path: impl AsRef<Path>, default_demand: f64) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ModelError::Io {
            context: "reading model file",
            source: e,
        })?;

        let file: ModelFile =
            serde_json::from_str(&content).map_err(|e| ModelError::Malformed {
                reason: e.to_string(),
            })?;

        if file.version != MODEL_FORMAT_VERSION {
            return Err(ModelError::Malformed {
                reason: format!("unsupported model format version {}", file.version),
            });
        }

        let actual = file.params.checksum();
        if actual != file.checksum {
            return Err(ModelError::ChecksumMismatch {
                expected: file.checksum,
                actual,
            });
        }

        tracing::info!(path = %path.display(), "Demand model loaded");
        Self::from_params(file.params, default_demand)
    }

    /// Load the model at `path` if it exists, otherwise start untrained.
    pub fn load_or_untrained(
        path: impl AsRef<Path>,
        default_demand: f64,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path, default_demand)
        } else {
            tracing::warn!(
                path = %path.display(),
                "Model file not found, predictor starts untrained"
            );
            Ok(Self::untrained(default_demand))
        }
    }
}

fn params_mse(params: &ModelParams, x: &[Vec<f64>], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    x.iter()
        .zip(y)
        .map(|(row, target)| (params.evaluate(row) - target).powi(2))
        .sum::<f64>()
        / n
}

impl DemandPredictor for LinearDemandModel {
    fn try_predict(&self, features: &FeatureRecord) -> Result<f64, PredictionError> {
        let params = self.params.as_ref().ok_or(PredictionError::Untrained)?;
        let vector = features.to_vector(params.embedding_width);
        if vector.len() != params.input_width() {
            return Err(PredictionError::DimensionMismatch {
                expected: params.input_width(),
                actual: vector.len(),
            });
        }
        Ok(params.evaluate(&vector))
    }

    fn default_demand(&self) -> f64 {
        self.default_demand
    }
}
