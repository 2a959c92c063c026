//! Result and response models
//!
//! Value objects handed back to callers: one for a text completion, one for a
//! nameplate extraction. Both are plain data with no shared state; the
//! extraction result is what the persistence layer stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::ai::catalog::BackendKind;
use crate::vision::aliases::{normalize_manufacturer, normalize_model_number};

/// Backend marker for results rejected before any provider was called
pub const QUALITY_CHECK_BACKEND: &str = "quality_check";

/// Backend marker for results where no provider produced an answer
pub const NO_BACKEND: &str = "none";

// ============================================================================
// Text generation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationResult {
    pub text: String,
    /// Realized cost in currency units
    pub cost: f64,
    pub model: String,
    pub backend: BackendKind,
}

// ============================================================================
// Vision extraction
// ============================================================================

/// Image-quality problems a vision backend can flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageIssue {
    Rotated,
    UpsideDown,
    Partial,
    Dirty,
    Blurry,
    Glare,
}

impl ImageIssue {
    /// Major issues mean the reader had to compensate (orientation, cropping)
    pub fn is_major(&self) -> bool {
        matches!(
            self,
            ImageIssue::Rotated | ImageIssue::UpsideDown | ImageIssue::Partial
        )
    }

    /// Lenient parse of the labels backends actually return
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "rotated" | "sideways" => Some(ImageIssue::Rotated),
            "upside_down" | "upsidedown" | "inverted" => Some(ImageIssue::UpsideDown),
            "partial" | "partially_visible" | "cropped" | "cut_off" => Some(ImageIssue::Partial),
            "dirty" | "dirt" | "grime" => Some(ImageIssue::Dirty),
            "blurry" | "blur" | "out_of_focus" => Some(ImageIssue::Blurry),
            "glare" | "reflection" | "reflective" => Some(ImageIssue::Glare),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIssue::Rotated => write!(f, "rotated"),
            ImageIssue::UpsideDown => write!(f, "upside_down"),
            ImageIssue::Partial => write!(f, "partial"),
            ImageIssue::Dirty => write!(f, "dirty"),
            ImageIssue::Blurry => write!(f, "blurry"),
            ImageIssue::Glare => write!(f, "glare"),
        }
    }
}

/// Electrical ratings read off the plate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElectricalSpecs {
    pub voltage: Option<String>,
    pub current: Option<String>,
    pub horsepower: Option<String>,
    pub phase: Option<String>,
    pub frequency: Option<String>,
    /// Anything else on the plate (RPM, IP rating, kW, enclosure...)
    #[serde(default)]
    pub additional: BTreeMap<String, String>,
}

/// Terminal failure carried inside a result instead of being thrown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("Image rejected: {reason}")]
    QualityRejected { reason: String },
    #[error("All vision providers failed (tried: [{}]){}", attempted.join(", "), last_error.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    AllBackendsFailed {
        /// Backends actually called, in order; empty when none could be attempted
        attempted: Vec<String>,
        last_error: Option<String>,
    },
}

impl ExtractionError {
    /// Wording for chat surfaces, with remediation hints
    pub fn user_message(&self) -> String {
        match self {
            ExtractionError::QualityRejected { reason } => format!(
                "I couldn't read that photo: {}. Please retake it straight-on, fill the frame with the nameplate and improve the lighting.",
                reason
            ),
            ExtractionError::AllBackendsFailed { attempted, .. } if attempted.is_empty() => {
                "Photo analysis is not available right now. Please try again later.".to_string()
            }
            ExtractionError::AllBackendsFailed { .. } => {
                "I could not process this photo. Please retake it closer to the nameplate with better lighting and try again.".to_string()
            }
        }
    }
}

/// Structured equipment data extracted from one nameplate photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionExtractionResult {
    pub request_id: Uuid,
    pub manufacturer: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub fault_code: Option<String>,
    pub equipment_type: Option<String>,
    pub equipment_subtype: Option<String>,
    pub condition: Option<String>,
    pub visible_issues: Option<String>,
    pub specs: ElectricalSpecs,
    pub raw_text: String,
    pub image_issues: Vec<ImageIssue>,
    /// Calibrated confidence in [0, 1]
    pub confidence: f64,
    /// Backend that produced this result, or a marker (`quality_check`, `none`)
    pub backend: String,
    pub model: String,
    pub processing_time_ms: u64,
    /// Cumulative cost across every attempt for this request
    pub cost: f64,
    pub error: Option<ExtractionError>,
    pub analyzed_at: DateTime<Utc>,
    #[serde(skip)]
    normalized: bool,
}

impl VisionExtractionResult {
    /// Empty result attributed to a backend/model
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            manufacturer: None,
            model_number: None,
            serial_number: None,
            fault_code: None,
            equipment_type: None,
            equipment_subtype: None,
            condition: None,
            visible_issues: None,
            specs: ElectricalSpecs::default(),
            raw_text: String::new(),
            image_issues: Vec::new(),
            confidence: 0.0,
            backend: backend.into(),
            model: model.into(),
            processing_time_ms: 0,
            cost: 0.0,
            error: None,
            analyzed_at: Utc::now(),
            normalized: false,
        }
    }

    /// Zero-confidence result carrying a terminal error
    pub fn failed(backend: impl Into<String>, error: ExtractionError) -> Self {
        let mut result = Self::new(backend, String::new());
        result.error = Some(error);
        result
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Resolve manufacturer aliases and canonicalize the model number.
    ///
    /// Runs once per result; later calls are no-ops.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }
        self.manufacturer = self.manufacturer.as_deref().map(normalize_manufacturer);
        self.model_number = self
            .model_number
            .as_deref()
            .map(normalize_model_number)
            .filter(|m| !m.is_empty());
        self.normalized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_issue_labels() {
        assert_eq!(ImageIssue::from_label("upside-down"), Some(ImageIssue::UpsideDown));
        assert_eq!(ImageIssue::from_label("Partially Visible"), Some(ImageIssue::Partial));
        assert_eq!(ImageIssue::from_label("GLARE"), Some(ImageIssue::Glare));
        assert_eq!(ImageIssue::from_label("haunted"), None);
    }

    #[test]
    fn test_major_issues() {
        assert!(ImageIssue::Rotated.is_major());
        assert!(ImageIssue::UpsideDown.is_major());
        assert!(ImageIssue::Partial.is_major());
        assert!(!ImageIssue::Glare.is_major());
        assert!(!ImageIssue::Dirty.is_major());
        assert!(!ImageIssue::Blurry.is_major());
    }

    #[test]
    fn test_normalize_runs_once() {
        let mut result = VisionExtractionResult::new("gemini", "gemini-2.0-flash");
        result.manufacturer = Some("Allen Bradley".to_string());
        result.model_number = Some("model: 22b-d010 n104".to_string());

        result.normalize();
        assert_eq!(result.manufacturer.as_deref(), Some("allen_bradley"));
        assert_eq!(result.model_number.as_deref(), Some("22B-D010N104"));
        assert!(result.is_normalized());

        result.manufacturer = Some("Some Vendor".to_string());
        result.normalize();
        assert_eq!(result.manufacturer.as_deref(), Some("Some Vendor"));
    }

    #[test]
    fn test_failed_result() {
        let result = VisionExtractionResult::failed(
            QUALITY_CHECK_BACKEND,
            ExtractionError::QualityRejected {
                reason: "image too dark".to_string(),
            },
        );
        assert!(!result.is_success());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.cost, 0.0);
        assert_eq!(result.backend, "quality_check");
    }

    #[test]
    fn test_all_failed_display() {
        let err = ExtractionError::AllBackendsFailed {
            attempted: vec!["groq".to_string(), "gemini".to_string()],
            last_error: Some("timeout".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "All vision providers failed (tried: [groq, gemini]): timeout"
        );

        let none = ExtractionError::AllBackendsFailed {
            attempted: vec![],
            last_error: None,
        };
        assert_eq!(none.to_string(), "All vision providers failed (tried: [])");
        assert!(none.user_message().contains("not available"));
    }

    #[test]
    fn test_quality_message_has_hints() {
        let err = ExtractionError::QualityRejected {
            reason: "image too small".to_string(),
        };
        let message = err.user_message();
        assert!(message.contains("image too small"));
        assert!(message.contains("lighting"));
    }
}
