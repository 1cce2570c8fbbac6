//! Gradient-weighted class activation maps (Grad-CAM).
//!
//! The explainer keeps no state between calls: every explanation runs one
//! [`TracedScorer::trace`] and works on the returned activations and
//! gradients, so a single explainer can serve concurrent requests.

pub mod colormap;
pub mod overlay;

use crate::error::ExplainError;
use crate::io::image::tensor_to_image;
use crate::model::{LayerTrace, TracedScorer};
use image::{imageops::FilterType, RgbImage};
use log::{debug, warn};
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    /// Weight of the colorized heatmap; the original gets `1 - heatmap_weight`.
    pub heatmap_weight: f32,
    /// Added to the normalization denominator.
    pub epsilon: f32,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            heatmap_weight: 0.4,
            epsilon: 1e-7,
        }
    }
}

/// Class activation map at feature-layer resolution, values in [0, 1].
#[derive(Debug, Clone)]
pub struct ActivationMap {
    pub values: Array2<f32>,
}

impl ActivationMap {
    /// Weights each activation channel by its mean gradient, sums, rectifies
    /// and min-max normalizes.
    pub fn from_trace(trace: &LayerTrace, epsilon: f32) -> Result<Self, ExplainError> {
        let activations = &trace.activations;
        let gradients = &trace.gradients;
        if activations.shape() != gradients.shape() {
            return Err(ExplainError::ShapeMismatch {
                activations: activations.shape().to_vec(),
                gradients: gradients.shape().to_vec(),
            });
        }
        let (channels, height, width) = activations.dim();
        if channels == 0 || height == 0 || width == 0 {
            return Err(ExplainError::EmptyFeatureMap);
        }

        let mut cam = Array2::<f32>::zeros((height, width));
        for (activation, gradient) in activations
            .axis_iter(Axis(0))
            .zip(gradients.axis_iter(Axis(0)))
        {
            let weight = gradient.mean().unwrap_or(0.0);
            cam.scaled_add(weight, &activation);
        }
        cam.mapv_inplace(|v| v.max(0.0));
        if cam.iter().any(|v| !v.is_finite()) {
            return Err(ExplainError::NonFinite);
        }

        let min = cam.iter().copied().fold(f32::INFINITY, f32::min);
        let max = cam.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let denom = max - min + epsilon;
        cam.mapv_inplace(|v| ((v - min) / denom).clamp(0.0, 1.0));
        Ok(Self { values: cam })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }
}

/// Final explanation image handed back to the caller.
#[derive(Debug, Clone)]
pub struct ExplanationOverlay {
    pub image: RgbImage,
    /// Class the heatmap explains; `None` on the fallback path.
    pub class_index: Option<usize>,
    pub heatmap_applied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ActivationExplainer {
    cfg: ExplainerConfig,
}

impl ActivationExplainer {
    pub fn new(cfg: ExplainerConfig) -> Self {
        Self { cfg }
    }

    /// Explains the scorer's top class for this input.
    pub fn explain(
        &self,
        input: &Array3<f32>,
        scorer: &dyn TracedScorer,
        original: &RgbImage,
    ) -> ExplanationOverlay {
        self.explain_class(input, scorer, original, None)
    }

    /// Never fails: any error yields the denormalized input without a heatmap.
    pub fn explain_class(
        &self,
        input: &Array3<f32>,
        scorer: &dyn TracedScorer,
        original: &RgbImage,
        class: Option<usize>,
    ) -> ExplanationOverlay {
        match self.try_explain(input, scorer, original, class) {
            Ok(overlay) => overlay,
            Err(err) => {
                warn!("Grad-CAM failed ({}), returning plain image", err);
                self.fallback(input, original)
            }
        }
    }

    pub fn try_explain(
        &self,
        input: &Array3<f32>,
        scorer: &dyn TracedScorer,
        original: &RgbImage,
        class: Option<usize>,
    ) -> Result<ExplanationOverlay, ExplainError> {
        let (width, height) = original.dimensions();
        if width == 0 || height == 0 {
            return Err(ExplainError::EmptyImage);
        }
        let (map, class_index) = self.activation_map(input, scorer, class)?;
        debug!(
            "activation map {:?} for class {}, resizing to {}x{}",
            map.dim(),
            class_index,
            width,
            height
        );
        let resized = overlay::resize_map(&map.values, width, height)?;
        let heat = overlay::colorize(&resized);
        let image = overlay::blend(&heat, original, self.cfg.heatmap_weight);
        Ok(ExplanationOverlay {
            image,
            class_index: Some(class_index),
            heatmap_applied: true,
        })
    }

    /// Normalized map at feature-layer resolution plus the explained class.
    pub fn activation_map(
        &self,
        input: &Array3<f32>,
        scorer: &dyn TracedScorer,
        class: Option<usize>,
    ) -> Result<(ActivationMap, usize), ExplainError> {
        // the pass works on its own copy; the caller's tensor is left untouched
        let owned = input.to_owned();
        let trace = scorer.trace(&owned, class)?;
        let map = ActivationMap::from_trace(&trace, self.cfg.epsilon)?;
        Ok((map, trace.class_index))
    }

    fn fallback(&self, input: &Array3<f32>, original: &RgbImage) -> ExplanationOverlay {
        let (width, height) = original.dimensions();
        let plain = tensor_to_image(input);
        let image = if plain.dimensions() == (width, height) {
            plain
        } else if width == 0 || height == 0 || plain.width() == 0 || plain.height() == 0 {
            RgbImage::new(width, height)
        } else {
            image::imageops::resize(&plain, width, height, FilterType::Triangle)
        };
        ExplanationOverlay {
            image,
            class_index: None,
            heatmap_applied: false,
        }
    }
}
