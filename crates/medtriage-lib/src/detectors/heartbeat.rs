use crate::signal::{HeartbeatWindow, RawSignal, WindowMethod};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters of the single-beat extractor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Output window length in samples.
    pub target_len: usize,
    /// Fraction trimmed from each end before searching for the peak.
    pub margin_fraction: f64,
    /// Moving-average width of the energy envelope, roughly one QRS complex.
    pub energy_window: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            target_len: 187,
            margin_fraction: 0.05,
            energy_window: 15,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
enum ExtractError {
    #[error("region of interest has {0} samples, need at least 2")]
    TooShort(usize),
    #[error("energy envelope contains non-finite values")]
    NonFinite,
}

/// Locates the most prominent QRS complex and slices a window around it.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatExtractor {
    cfg: ExtractorConfig,
}

impl HeartbeatExtractor {
    pub fn new(cfg: ExtractorConfig) -> Self {
        Self { cfg }
    }

    pub fn with_target_len(target_len: usize) -> Self {
        Self::new(ExtractorConfig {
            target_len,
            ..ExtractorConfig::default()
        })
    }

    /// Always returns exactly `target_len` samples.
    pub fn extract(&self, signal: &RawSignal) -> HeartbeatWindow {
        let data = signal.samples();
        let target_len = self.cfg.target_len;
        match self.locate_peak(data) {
            Ok(peak) => {
                debug!("heartbeat peak at sample {} of {}", peak, data.len());
                let raw = edge_padded_window(data, peak, target_len);
                HeartbeatWindow::from_raw(raw, Some(peak), WindowMethod::Centered)
            }
            Err(err) => {
                warn!("beat slicing failed ({}), resampling whole signal", err);
                let raw = resample_linear(data, target_len);
                HeartbeatWindow::from_raw(raw, None, WindowMethod::Resampled)
            }
        }
    }

    fn locate_peak(&self, data: &[f64]) -> Result<usize, ExtractError> {
        let (roi, offset) = self.region_of_interest(data);
        if roi.len() < 2 {
            return Err(ExtractError::TooShort(roi.len()));
        }
        let envelope = energy_envelope(roi, self.cfg.energy_window);
        if envelope.iter().any(|v| !v.is_finite()) {
            return Err(ExtractError::NonFinite);
        }
        Ok(plateau_argmax(&envelope) + offset)
    }

    fn region_of_interest<'a>(&self, data: &'a [f64]) -> (&'a [f64], usize) {
        let margin = (data.len() as f64 * self.cfg.margin_fraction) as usize;
        if data.len() > self.cfg.target_len * 2 && margin > 0 && 2 * margin < data.len() {
            (&data[margin..data.len() - margin], margin)
        } else {
            (data, 0)
        }
    }
}

/// First difference, squared, then smoothed by a centred moving average.
fn energy_envelope(roi: &[f64], win: usize) -> Vec<f64> {
    let squared = square(&first_difference(roi));
    centered_moving_average(&squared, win)
}

fn first_difference(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

// Output has the input's length; samples outside the signal count as zero
// and every output is divided by the full window width.
fn centered_moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    // even widths reach one sample further back than forward
    let right = (win - 1) / 2;
    let left = win - 1 - right;
    let mut prefix = Vec::with_capacity(data.len() + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in data {
        acc += x;
        prefix.push(acc);
    }
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(left);
            let end = (i + right + 1).min(data.len());
            (prefix[end] - prefix[start]) / win as f64
        })
        .collect()
}

/// Index of the maximum; for a flat run of maxima, the middle of the first run.
fn plateau_argmax(data: &[f64]) -> usize {
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let tol = max.abs() * 1e-12;
    let Some(first) = data.iter().position(|&v| v >= max - tol) else {
        return 0;
    };
    let run = data[first..]
        .iter()
        .take_while(|&&v| v >= max - tol)
        .count();
    first + (run - 1) / 2
}

/// `target_len` samples starting at `center - target_len / 2`, edge-replicated
/// beyond either end of `data`.
fn edge_padded_window(data: &[f64], center: usize, target_len: usize) -> Vec<f64> {
    let last = data.len() - 1;
    let start = center as isize - (target_len / 2) as isize;
    (0..target_len as isize)
        .map(|i| {
            let idx = (start + i).clamp(0, last as isize) as usize;
            data[idx]
        })
        .collect()
}

/// Linear interpolation of `data` onto `target_len` points over a [0, 1] axis.
pub fn resample_linear(data: &[f64], target_len: usize) -> Vec<f64> {
    if target_len == 0 || data.is_empty() {
        return Vec::new();
    }
    if data.len() == 1 {
        return vec![data[0]; target_len];
    }
    let span = (data.len() - 1) as f64;
    (0..target_len)
        .map(|i| {
            let x = if target_len == 1 {
                0.0
            } else {
                i as f64 / (target_len - 1) as f64
            };
            let pos = x * span;
            let lo = (pos.floor() as usize).min(data.len() - 1);
            let hi = (lo + 1).min(data.len() - 1);
            let frac = pos - lo as f64;
            data[lo] + (data[hi] - data[lo]) * frac
        })
        .collect()
}
