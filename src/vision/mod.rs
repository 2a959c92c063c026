//! Vision module - nameplate extraction from equipment photos

pub mod aliases;
pub mod confidence;
pub mod parser;
pub mod pipeline;
pub mod quality;
pub mod taxonomy;

pub use aliases::{normalize_manufacturer, normalize_model_number};
pub use confidence::{calculate_confidence, calibrate};
pub use pipeline::{AnalyzeOptions, VisionPipeline};
pub use quality::{check_image_quality, QualityConfig, QualityVerdict};
