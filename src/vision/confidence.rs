//! Confidence calibration
//!
//! The final confidence of an attempt is the larger of the backend's own
//! estimate and a score computed from the structured fields, then capped when
//! the backend flagged image problems. Everything here is a pure function.

use crate::models::{ImageIssue, VisionExtractionResult};
use crate::vision::aliases::is_known_manufacturer;

/// Ceiling of the computed score
pub const MAX_CALCULATED_CONFIDENCE: f64 = 0.95;

/// Cap when a major issue (rotated, upside down, partial) was flagged
pub const MAJOR_ISSUE_CAP: f64 = 0.65;

/// Cap for any other flagged issue (dirt, glare, blur)
pub const MINOR_ISSUE_CAP: f64 = 0.80;

/// Score computed from the structured fields alone
pub fn calculate_confidence(result: &VisionExtractionResult) -> f64 {
    let mut score: f64 = 0.0;

    if let Some(manufacturer) = &result.manufacturer {
        score += 0.25;
        if is_known_manufacturer(manufacturer) {
            score += 0.05;
        }
    }
    if result.model_number.is_some() {
        score += 0.30;
    }
    if result.serial_number.is_some() {
        score += 0.15;
    }
    if result
        .specs
        .voltage
        .as_deref()
        .is_some_and(|v| v.to_lowercase().contains('v'))
    {
        score += 0.10;
    }

    let raw_len = result.raw_text.chars().count();
    if raw_len >= 20 {
        score += 0.10;
    } else if raw_len < 10 {
        score *= 0.5;
    }

    if matches!(result.specs.phase.as_deref(), Some("1") | Some("3")) {
        score += 0.05;
    }

    score.min(MAX_CALCULATED_CONFIDENCE)
}

/// Cap confidence according to the flagged image issues
pub fn apply_issue_caps(confidence: f64, issues: &[ImageIssue]) -> f64 {
    if issues.iter().any(ImageIssue::is_major) {
        confidence.min(MAJOR_ISSUE_CAP)
    } else if !issues.is_empty() {
        confidence.min(MINOR_ISSUE_CAP)
    } else {
        confidence
    }
}

/// max(self-reported, calculated), then issue caps
pub fn calibrate(self_reported: f64, calculated: f64, issues: &[ImageIssue]) -> f64 {
    apply_issue_caps(self_reported.max(calculated), issues)
}
