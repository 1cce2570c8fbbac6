use super::ImageEnhancer;
use crate::config::TriageConfig;
use crate::error::TriageError;
use crate::explain::{ActivationExplainer, ExplanationOverlay};
use crate::io::image::{png_data_url, to_input_tensor};
use crate::model::labels::{BONE_CLASSES, SCABIES_DESCRIPTION, SCABIES_TREATMENT, SKIN_CLASSES};
use crate::model::{classify, ClassScore, TracedScorer};
use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

/// Which image classifier an upload is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Bone,
    Skin,
}

impl ImageKind {
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            ImageKind::Bone => &BONE_CLASSES,
            ImageKind::Skin => &SKIN_CLASSES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
    pub kind: ImageKind,
    pub label: String,
    pub class_index: usize,
    pub confidence: f64,
    pub scores: Vec<ClassScore>,
    /// Grad-CAM overlay as a PNG data URL.
    pub gradcam: String,
    pub heatmap_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
}

/// Report plus the raw overlay for callers that write it to disk.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub report: ImageReport,
    pub overlay: ExplanationOverlay,
}

#[derive(Debug, Clone)]
pub struct ImagePipeline {
    input_size: u32,
    explainer: ActivationExplainer,
}

impl Default for ImagePipeline {
    fn default() -> Self {
        Self::from_config(&TriageConfig::default())
    }
}

impl ImagePipeline {
    pub fn new(input_size: u32, explainer: ActivationExplainer) -> Self {
        Self {
            input_size,
            explainer,
        }
    }

    pub fn from_config(cfg: &TriageConfig) -> Self {
        Self::new(cfg.image.input_size, ActivationExplainer::new(cfg.explainer))
    }

    /// Classifies the original image and explains the predicted class.
    ///
    /// The enhancer only produces the extra preview; classification always
    /// sees the unmodified upload.
    pub fn analyze(
        &self,
        kind: ImageKind,
        image: &RgbImage,
        scorer: Option<&dyn TracedScorer>,
        enhancer: Option<&dyn ImageEnhancer>,
    ) -> Result<ImageAnalysis, TriageError> {
        let scorer = scorer.ok_or_else(|| {
            TriageError::ModelUnavailable(format!("{:?} model weights not loaded", kind))
        })?;
        let input = to_input_tensor(image, self.input_size);
        let prediction = classify(scorer, &input, kind.labels())?;
        debug!(
            "{:?}: {} at {:.1}%",
            kind, prediction.label, prediction.confidence
        );

        let overlay =
            self.explainer
                .explain_class(&input, scorer, image, Some(prediction.class_index));
        let enhanced = enhancer
            .map(|e| png_data_url(&e.enhance(image)))
            .transpose()?;
        let scabies = kind == ImageKind::Skin && prediction.label.to_lowercase().contains("scabies");

        let report = ImageReport {
            kind,
            label: prediction.label,
            class_index: prediction.class_index,
            confidence: prediction.confidence,
            scores: prediction.scores,
            gradcam: png_data_url(&overlay.image)?,
            heatmap_applied: overlay.heatmap_applied,
            enhanced,
            description: scabies.then(|| SCABIES_DESCRIPTION.to_string()),
            treatment: scabies.then(|| SCABIES_TREATMENT.to_string()),
        };
        Ok(ImageAnalysis { report, overlay })
    }
}
