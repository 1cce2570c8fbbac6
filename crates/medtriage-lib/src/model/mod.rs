//! Scoring seam between the pipelines and whatever network produces logits.
//!
//! Pretrained networks live outside this crate. Pipelines only need
//! [`Scorer`] for classification and [`TracedScorer`] for Grad-CAM, which
//! returns the target layer's activations and gradients as plain values
//! instead of capturing them through hooks.

pub mod conv_head;
pub mod dense;
pub mod labels;

use crate::error::{ExplainError, ModelError};
use log::{debug, warn};
use ndarray::Array3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

pub use conv_head::ConvHeadScorer;
pub use dense::DenseSignalScorer;

/// Maps a `[C, H, W]` input tensor to unnormalized class scores.
pub trait Scorer {
    fn num_classes(&self) -> usize;
    fn score(&self, input: &Array3<f32>) -> Result<Vec<f32>, ModelError>;
}

/// Forward pass output including the target layer's activations `[K, H', W']`.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    pub logits: Vec<f32>,
    pub activations: Array3<f32>,
}

/// One complete forward + backward pass for a single class.
#[derive(Debug, Clone)]
pub struct LayerTrace {
    pub logits: Vec<f32>,
    pub class_index: usize,
    pub activations: Array3<f32>,
    pub gradients: Array3<f32>,
}

/// A scorer that can report activations and gradients of its target layer.
pub trait TracedScorer: Scorer {
    fn forward_traced(&self, input: &Array3<f32>) -> Result<ForwardTrace, ModelError>;

    /// Gradient of `logits[class_index]` w.r.t. the target layer output.
    /// `None` means the backward pass never reached the target layer.
    fn backward_traced(
        &self,
        forward: &ForwardTrace,
        class_index: usize,
    ) -> Result<Option<Array3<f32>>, ModelError>;

    /// Forward pass, class selection (argmax unless `class` is given), backward pass.
    fn trace(&self, input: &Array3<f32>, class: Option<usize>) -> Result<LayerTrace, ExplainError> {
        let forward = self.forward_traced(input)?;
        if forward.logits.is_empty() {
            return Err(ExplainError::NoScores);
        }
        let class_index = match class {
            Some(idx) if idx >= forward.logits.len() => {
                return Err(ModelError::ClassOutOfRange {
                    index: idx,
                    classes: forward.logits.len(),
                }
                .into())
            }
            Some(idx) => idx,
            None => argmax(&forward.logits),
        };
        debug!("tracing class {} of {}", class_index, forward.logits.len());
        let gradients = self
            .backward_traced(&forward, class_index)?
            .ok_or(ExplainError::GradientNotCaptured)?;
        Ok(LayerTrace {
            logits: forward.logits,
            class_index,
            activations: forward.activations,
            gradients,
        })
    }
}

/// Serializes every pass through a shared scorer that keeps per-pass state.
///
/// `trace` holds the lock across the forward and backward halves so two
/// requests can never interleave on the same instance.
pub struct Exclusive<S> {
    inner: Mutex<S>,
}

impl<S> Exclusive<S> {
    pub fn new(scorer: S) -> Self {
        Self {
            inner: Mutex::new(scorer),
        }
    }
}

impl<S: Scorer> Scorer for Exclusive<S> {
    fn num_classes(&self) -> usize {
        // the class count is fixed at load time, a panicked pass cannot change it
        let guard = self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("scorer lock poisoned by an earlier pass");
            PoisonError::into_inner(poisoned)
        });
        guard.num_classes()
    }

    fn score(&self, input: &Array3<f32>) -> Result<Vec<f32>, ModelError> {
        let guard = self.inner.lock().map_err(|_| ModelError::Poisoned)?;
        guard.score(input)
    }
}

impl<S: TracedScorer> TracedScorer for Exclusive<S> {
    fn forward_traced(&self, input: &Array3<f32>) -> Result<ForwardTrace, ModelError> {
        let guard = self.inner.lock().map_err(|_| ModelError::Poisoned)?;
        guard.forward_traced(input)
    }

    fn backward_traced(
        &self,
        forward: &ForwardTrace,
        class_index: usize,
    ) -> Result<Option<Array3<f32>>, ModelError> {
        let guard = self.inner.lock().map_err(|_| ModelError::Poisoned)?;
        guard.backward_traced(forward, class_index)
    }

    fn trace(&self, input: &Array3<f32>, class: Option<usize>) -> Result<LayerTrace, ExplainError> {
        let guard = self.inner.lock().map_err(|_| ModelError::Poisoned)?;
        guard.trace(input, class)
    }
}

/// Per-class probability, in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: String,
    pub percent: f64,
}

/// Softmax decision of a scorer over a labelled class list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    /// Probability of the winning class, in percent.
    pub confidence: f64,
    pub scores: Vec<ClassScore>,
}

/// Runs the scorer and converts logits to a labelled prediction.
pub fn classify<S: Scorer + ?Sized>(
    scorer: &S,
    input: &Array3<f32>,
    labels: &[&str],
) -> Result<Prediction, ModelError> {
    let logits = scorer.score(input)?;
    if logits.is_empty() {
        return Err(ModelError::Weights("scorer returned no classes".into()));
    }
    let probs = softmax(&logits);
    let class_index = argmax(&probs);
    let label_of = |idx: usize| labels.get(idx).copied().unwrap_or("Unknown").to_string();
    let scores = probs
        .iter()
        .enumerate()
        .map(|(idx, p)| ClassScore {
            label: label_of(idx),
            percent: *p as f64 * 100.0,
        })
        .collect();
    Ok(Prediction {
        class_index,
        label: label_of(class_index),
        confidence: probs[class_index] as f64 * 100.0,
        scores,
    })
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|v| v / total).collect()
}

/// First index of the largest value.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (idx, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = idx;
        }
    }
    best
}

/// Reads a JSON weight file; a missing file means the model is unavailable.
pub(crate) fn load_json_weights<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    if !path.exists() {
        return Err(ModelError::Missing(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| ModelError::Weights(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| ModelError::Weights(format!("{}: {}", path.display(), e)))
}
