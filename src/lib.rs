//! Nameplate AI - cost-ordered inference routing and nameplate extraction
//!
//! Text requests are routed through capability tiers of interchangeable
//! backends, cheapest first. Equipment photos go through a quality gate and a
//! cascade of vision backends until one reads the nameplate confidently.

// Inference routing
pub mod ai;

// Nameplate extraction
pub mod models;
pub mod vision;

// Answers built on extraction results
pub mod assist;

// Ambient
pub mod config;
pub mod core;
pub mod telemetry;

pub use ai::{GenerateRequest, InferenceRouter, RouterError};
pub use models::{TextGenerationResult, VisionExtractionResult};
pub use vision::{AnalyzeOptions, VisionPipeline};
