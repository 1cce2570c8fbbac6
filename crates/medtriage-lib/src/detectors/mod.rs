pub mod heartbeat;

pub use heartbeat::{resample_linear, ExtractorConfig, HeartbeatExtractor};
