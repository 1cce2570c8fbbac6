use crate::config::TriageConfig;
use crate::detectors::HeartbeatExtractor;
use crate::error::TriageError;
use crate::io::text::parse_signal_bytes;
use crate::model::labels::{ecg_explanation, ECG_CLASSES};
use crate::model::{classify, ClassScore, Scorer};
use crate::plot::{ecg_grid_data_url, EcgPlotOptions};
use crate::signal::HeartbeatWindow;
use log::debug;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcgReport {
    pub label: String,
    pub class_index: usize,
    /// Percent.
    pub confidence: f64,
    pub explanation: String,
    pub scores: Vec<ClassScore>,
    /// PNG data URL of the full recording.
    pub plot: String,
    pub window: HeartbeatWindow,
}

/// Heartbeat classification of an uploaded recording.
#[derive(Debug, Clone, Default)]
pub struct EcgPipeline {
    extractor: HeartbeatExtractor,
    plot: EcgPlotOptions,
}

impl EcgPipeline {
    pub fn new(extractor: HeartbeatExtractor, plot: EcgPlotOptions) -> Self {
        Self { extractor, plot }
    }

    pub fn from_config(cfg: &TriageConfig) -> Self {
        let plot = EcgPlotOptions {
            width: cfg.plot.width,
            row_height: cfg.plot.height,
            ..EcgPlotOptions::default()
        };
        Self::new(HeartbeatExtractor::new(cfg.extractor), plot)
    }

    pub fn plot_options_mut(&mut self) -> &mut EcgPlotOptions {
        &mut self.plot
    }

    /// `scorer` is `None` when no model weights could be loaded.
    pub fn analyze(
        &self,
        bytes: &[u8],
        source_name: &str,
        scorer: Option<&dyn Scorer>,
    ) -> Result<EcgReport, TriageError> {
        let scorer = scorer
            .ok_or_else(|| TriageError::ModelUnavailable("ECG model weights not loaded".into()))?;
        let signal = parse_signal_bytes(bytes)?;

        let mut plot_opts = self.plot.clone();
        plot_opts.source_name = source_name.to_string();
        let plot = ecg_grid_data_url(&signal, &plot_opts);

        let window = self.extractor.extract(&signal);
        let input = window_tensor(&window);
        let prediction = classify(scorer, &input, &ECG_CLASSES)?;
        debug!(
            "{}: class {} ({:.1}%) via {:?} window",
            source_name, prediction.class_index, prediction.confidence, window.method
        );
        Ok(EcgReport {
            explanation: ecg_explanation(prediction.class_index).to_string(),
            label: prediction.label,
            class_index: prediction.class_index,
            confidence: prediction.confidence,
            scores: prediction.scores,
            plot,
            window,
        })
    }
}

/// Normalized beat as a `[1, 1, L]` tensor.
pub fn window_tensor(window: &HeartbeatWindow) -> Array3<f32> {
    let len = window.samples.len();
    Array3::from_shape_fn((1, 1, len), |(_, _, i)| window.samples[i] as f32)
}
