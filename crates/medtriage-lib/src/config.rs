use crate::detectors::ExtractorConfig;
use crate::explain::ExplainerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Side length of the square classifier input.
    pub input_size: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { input_size: 224 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub width: u32,
    /// Height of a single lead panel.
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub viewer_base: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            viewer_base: "http://localhost:8042".into(),
        }
    }
}

impl ArchiveConfig {
    /// Browser link that opens a study in the archive's web viewer.
    pub fn viewer_url(&self, study_uid: &str) -> String {
        format!(
            "{}/ohif/viewer?StudyInstanceUIDs={}",
            self.viewer_base.trim_end_matches('/'),
            study_uid
        )
    }
}

/// Runtime settings for every pipeline; each table and field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub extractor: ExtractorConfig,
    pub explainer: ExplainerConfig,
    pub image: ImageConfig,
    pub plot: PlotConfig,
    pub archive: ArchiveConfig,
}

pub fn read_config(path: &Path) -> Result<TriageConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: TriageConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}
