use super::{load_json_weights, ForwardTrace, Scorer, TracedScorer};
use crate::error::ModelError;
use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Small differentiable image classifier:
/// average pool -> 1x1 conv -> ReLU (target layer) -> global average pool -> linear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvHeadScorer {
    /// Side of the square average-pooling window applied to the input.
    #[serde(default = "default_pool")]
    pub pool: usize,
    /// `conv_weights[feature][input_channel]`
    pub conv_weights: Vec<Vec<f32>>,
    pub conv_bias: Vec<f32>,
    /// `head_weights[class][feature]`
    pub head_weights: Vec<Vec<f32>>,
    pub head_bias: Vec<f32>,
}

fn default_pool() -> usize {
    1
}

impl ConvHeadScorer {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let scorer: Self = load_json_weights(path)?;
        scorer.validate()?;
        Ok(scorer)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.pool == 0 {
            return Err(ModelError::Weights("pool must be at least 1".into()));
        }
        let features = self.conv_weights.len();
        if features == 0 || self.conv_bias.len() != features {
            return Err(ModelError::Weights(format!(
                "{} conv rows but {} conv biases",
                features,
                self.conv_bias.len()
            )));
        }
        let channels = self.input_channels();
        if channels == 0 || self.conv_weights.iter().any(|row| row.len() != channels) {
            return Err(ModelError::Weights("conv rows must share a non-zero width".into()));
        }
        if self.head_weights.is_empty() || self.head_weights.len() != self.head_bias.len() {
            return Err(ModelError::Weights(format!(
                "{} head rows but {} head biases",
                self.head_weights.len(),
                self.head_bias.len()
            )));
        }
        if self.head_weights.iter().any(|row| row.len() != features) {
            return Err(ModelError::Weights(format!(
                "head rows must have {} entries",
                features
            )));
        }
        Ok(())
    }

    pub fn input_channels(&self) -> usize {
        self.conv_weights.first().map(Vec::len).unwrap_or(0)
    }

    fn pooled(&self, input: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let (channels, height, width) = input.dim();
        let (out_h, out_w) = (height / self.pool, width / self.pool);
        if channels != self.input_channels() || out_h == 0 || out_w == 0 {
            return Err(ModelError::InputShape {
                expected: format!(
                    "[{}, >={}, >={}]",
                    self.input_channels(),
                    self.pool,
                    self.pool
                ),
                actual: input.shape().to_vec(),
            });
        }
        let p = self.pool;
        Ok(Array3::from_shape_fn((channels, out_h, out_w), |(c, i, j)| {
            input
                .slice(s![c, i * p..(i + 1) * p, j * p..(j + 1) * p])
                .mean()
                .unwrap_or(0.0)
        }))
    }

    fn feature_map(&self, input: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let pooled = self.pooled(input)?;
        let (_, out_h, out_w) = pooled.dim();
        let features = self.conv_weights.len();
        Ok(Array3::from_shape_fn((features, out_h, out_w), |(k, i, j)| {
            let z = self.conv_bias[k]
                + self.conv_weights[k]
                    .iter()
                    .enumerate()
                    .map(|(c, w)| w * pooled[[c, i, j]])
                    .sum::<f32>();
            z.max(0.0)
        }))
    }

    fn head(&self, activations: &Array3<f32>) -> Vec<f32> {
        let means: Vec<f32> = activations
            .axis_iter(Axis(0))
            .map(|channel| channel.mean().unwrap_or(0.0))
            .collect();
        self.head_weights
            .iter()
            .zip(&self.head_bias)
            .map(|(row, b)| b + row.iter().zip(&means).map(|(w, m)| w * m).sum::<f32>())
            .collect()
    }
}

impl Scorer for ConvHeadScorer {
    fn num_classes(&self) -> usize {
        self.head_weights.len()
    }

    fn score(&self, input: &Array3<f32>) -> Result<Vec<f32>, ModelError> {
        Ok(self.head(&self.feature_map(input)?))
    }
}

impl TracedScorer for ConvHeadScorer {
    fn forward_traced(&self, input: &Array3<f32>) -> Result<ForwardTrace, ModelError> {
        let activations = self.feature_map(input)?;
        let logits = self.head(&activations);
        Ok(ForwardTrace {
            logits,
            activations,
        })
    }

    // d logit_n / d A[k, i, j] = head_weights[n][k] / (H' * W')
    fn backward_traced(
        &self,
        forward: &ForwardTrace,
        class_index: usize,
    ) -> Result<Option<Array3<f32>>, ModelError> {
        let row = self
            .head_weights
            .get(class_index)
            .ok_or(ModelError::ClassOutOfRange {
                index: class_index,
                classes: self.head_weights.len(),
            })?;
        let (features, h, w) = forward.activations.dim();
        let area = (h * w).max(1) as f32;
        Ok(Some(Array3::from_shape_fn((features, h, w), |(k, _, _)| {
            row[k] / area
        })))
    }
}
