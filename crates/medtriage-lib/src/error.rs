use thiserror::Error;

/// Failures surfaced by the triage pipelines.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("failed to parse input: {0}")]
    Parse(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("numeric failure: {0}")]
    Compute(String),
    #[error("archive request failed: {0}")]
    Archive(String),
    #[error("image encoding failed: {0}")]
    Image(String),
}

impl From<image::ImageError> for TriageError {
    fn from(value: image::ImageError) -> Self {
        TriageError::Image(value.to_string())
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for TriageError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        TriageError::Image(format!("plot rendering failed: {:?}", value))
    }
}

impl From<ModelError> for TriageError {
    fn from(value: ModelError) -> Self {
        match value {
            ModelError::Missing(path) => TriageError::ModelUnavailable(path),
            other => TriageError::Compute(other.to_string()),
        }
    }
}

/// Errors raised by scorers and by weight loading.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("weights not found at {0}")]
    Missing(String),
    #[error("malformed weights: {0}")]
    Weights(String),
    #[error("input shape {actual:?} does not match expected {expected}")]
    InputShape { expected: String, actual: Vec<usize> },
    #[error("class index {index} out of range for {classes} classes")]
    ClassOutOfRange { index: usize, classes: usize },
    #[error("scorer lock poisoned")]
    Poisoned,
}

/// Reasons a Grad-CAM pass could not produce a heatmap.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("scorer failed: {0}")]
    Scorer(#[from] ModelError),
    #[error("scorer returned no class scores")]
    NoScores,
    #[error("gradient of the target layer was not captured")]
    GradientNotCaptured,
    #[error("activation shape {activations:?} does not match gradient shape {gradients:?}")]
    ShapeMismatch {
        activations: Vec<usize>,
        gradients: Vec<usize>,
    },
    #[error("target layer produced an empty feature map")]
    EmptyFeatureMap,
    #[error("activation map contains non-finite values")]
    NonFinite,
    #[error("original image has zero area")]
    EmptyImage,
}
