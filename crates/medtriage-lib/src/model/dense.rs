use super::{load_json_weights, Scorer};
use crate::error::ModelError;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Single dense layer over a flattened heartbeat tensor `[1, 1, L]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseSignalScorer {
    /// `weights[class][sample]`
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl DenseSignalScorer {
    pub fn new(weights: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self, ModelError> {
        let scorer = Self { weights, bias };
        scorer.validate()?;
        Ok(scorer)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let scorer: Self = load_json_weights(path)?;
        scorer.validate()?;
        Ok(scorer)
    }

    /// Number of samples each row expects.
    pub fn input_len(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.weights.is_empty() {
            return Err(ModelError::Weights("dense layer has no classes".into()));
        }
        if self.weights.len() != self.bias.len() {
            return Err(ModelError::Weights(format!(
                "{} weight rows but {} biases",
                self.weights.len(),
                self.bias.len()
            )));
        }
        let width = self.input_len();
        if width == 0 || self.weights.iter().any(|row| row.len() != width) {
            return Err(ModelError::Weights("dense rows must share a non-zero width".into()));
        }
        Ok(())
    }
}

impl Scorer for DenseSignalScorer {
    fn num_classes(&self) -> usize {
        self.weights.len()
    }

    fn score(&self, input: &Array3<f32>) -> Result<Vec<f32>, ModelError> {
        if input.len() != self.input_len() {
            return Err(ModelError::InputShape {
                expected: format!("{} samples", self.input_len()),
                actual: input.shape().to_vec(),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(input.iter()).map(|(w, x)| w * x).sum::<f32>())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scores_flattened_input() {
        let scorer = DenseSignalScorer::new(vec![vec![1.0, 0.0], vec![0.0, 2.0]], vec![0.0, 1.0])
            .unwrap();
        let input = Array3::from_shape_vec((1, 1, 2), vec![3.0, 4.0]).unwrap();
        assert_eq!(scorer.score(&input).unwrap(), vec![3.0, 9.0]);
    }

    #[test]
    fn rejects_wrong_length() {
        let scorer = DenseSignalScorer::new(vec![vec![1.0; 3]], vec![0.0]).unwrap();
        let input = Array3::<f32>::zeros((1, 1, 5));
        assert!(matches!(
            scorer.score(&input),
            Err(ModelError::InputShape { .. })
        ));
    }

    #[test]
    fn rejects_ragged_weights() {
        assert!(DenseSignalScorer::new(vec![vec![1.0; 3], vec![1.0; 2]], vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn loads_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"weights": [[0.5, 0.5]], "bias": [0.1]}}"#).unwrap();
        let scorer = DenseSignalScorer::load(file.path()).unwrap();
        assert_eq!(scorer.num_classes(), 1);
        assert_eq!(scorer.input_len(), 2);
    }
}
