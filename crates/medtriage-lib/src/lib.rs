pub mod config;
pub mod detectors;
pub mod error;
pub mod explain;
pub mod io;
pub mod model;
pub mod plot;
pub mod signal;
pub mod triage;

pub use config::{read_config, TriageConfig};
pub use detectors::*;
pub use error::{ExplainError, ModelError, TriageError};
pub use explain::{ActivationExplainer, ExplainerConfig, ExplanationOverlay};
pub use signal::*;
