use crate::error::TriageError;
use serde::{Deserialize, Serialize};

/// Parsed amplitude samples of one recording. Never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    samples: Vec<f64>,
}

impl RawSignal {
    pub fn new(samples: Vec<f64>) -> Result<Self, TriageError> {
        if samples.is_empty() {
            return Err(TriageError::Parse("signal contains no samples".into()));
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// How a heartbeat window was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMethod {
    /// Sliced around the energy peak.
    Centered,
    /// Whole signal linearly resampled after extraction failed.
    Resampled,
}

/// Fixed-length beat handed to the ECG classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatWindow {
    /// Samples min-max normalized to [0, 1].
    pub samples: Vec<f64>,
    /// The same samples before normalization.
    pub raw: Vec<f64>,
    /// Peak index in original signal coordinates.
    pub peak: Option<usize>,
    pub method: WindowMethod,
}

impl HeartbeatWindow {
    pub fn from_raw(raw: Vec<f64>, peak: Option<usize>, method: WindowMethod) -> Self {
        let samples = normalize_unit(&raw);
        Self {
            samples,
            raw,
            peak,
            method,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// `(x - min) / (max - min + 1e-6)`; a flat input maps to zeros.
pub fn normalize_unit(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min + 1e-6;
    data.iter().map(|x| (x - min) / range).collect()
}
