use crate::error::TriageError;
use crate::signal::RawSignal;
use anyhow::{Context, Result};
use std::path::Path;

/// Binary uploads shorter than this are not trusted to be a recording.
pub const MIN_BINARY_SAMPLES: usize = 1000;

/// Decode an uploaded recording.
///
/// UTF-8 payloads are read as numbers separated by commas or whitespace;
/// tokens that are not finite numbers are skipped. Anything else is taken as
/// little-endian `i16` samples.
pub fn parse_signal_bytes(bytes: &[u8]) -> Result<RawSignal, TriageError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_signal_text(text),
        Err(_) => parse_i16_le(bytes),
    }
}

pub fn parse_signal_text(text: &str) -> Result<RawSignal, TriageError> {
    let samples: Vec<f64> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect();
    if samples.is_empty() {
        return Err(TriageError::Parse("no numeric samples found".into()));
    }
    RawSignal::new(samples)
}

fn parse_i16_le(bytes: &[u8]) -> Result<RawSignal, TriageError> {
    if bytes.len() % 2 != 0 {
        return Err(TriageError::Parse(format!(
            "binary payload of {} bytes is not a whole number of i16 samples",
            bytes.len()
        )));
    }
    let samples: Vec<f64> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64)
        .collect();
    if samples.len() <= MIN_BINARY_SAMPLES {
        return Err(TriageError::Parse(format!(
            "binary payload holds only {} samples",
            samples.len()
        )));
    }
    RawSignal::new(samples)
}

/// Read a recording from disk in any format `parse_signal_bytes` accepts.
pub fn read_signal(path: &Path) -> Result<RawSignal> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_signal_bytes(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}
