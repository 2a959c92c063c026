//! Image quality gate
//! Rejects photos that are unlikely to be readable before any money is spent
//! on inference. Thresholds are lenient: reflective plates and shop-floor
//! lighting are common and the vision backends cope with them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    pub min_width: u32,
    pub min_height: u32,
    /// Luma below this counts as a dark pixel
    pub dark_threshold: u8,
    /// Luma above this counts as a bright pixel
    pub bright_threshold: u8,
    /// Reject when the dark-pixel fraction exceeds this
    pub max_dark_ratio: f32,
    /// Reject when the bright-pixel fraction exceeds this
    pub max_bright_ratio: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_width: 200,
            min_height: 200,
            dark_threshold: 30,
            bright_threshold: 225,
            max_dark_ratio: 0.90,
            max_bright_ratio: 0.90,
        }
    }
}

/// Pass/fail plus the reason shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passed: bool,
    pub reason: String,
}

impl QualityVerdict {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// Run the gate with default thresholds
pub fn check_image_quality(bytes: &[u8]) -> QualityVerdict {
    check_image_quality_with(bytes, &QualityConfig::default())
}

/// Run the gate on the blocking pool so decoding a large photo does not hold
/// up other requests. A failed task lets the image through.
pub async fn check_image_quality_blocking(
    bytes: Arc<[u8]>,
    config: QualityConfig,
) -> QualityVerdict {
    tokio::task::spawn_blocking(move || check_image_quality_with(&bytes, &config))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Quality check task failed: {}", e);
            QualityVerdict::pass(format!("quality check skipped: {}", e))
        })
}

/// Dimensions first, then the brightness histogram. An image that cannot be
/// decoded is let through.
pub fn check_image_quality_with(bytes: &[u8], config: &QualityConfig) -> QualityVerdict {
    let image = match image::load_from_memory(bytes) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!("Quality check could not decode image: {}", e);
            return QualityVerdict::pass(format!("quality check skipped: {}", e));
        }
    };

    let (width, height) = (image.width(), image.height());
    if width < config.min_width || height < config.min_height {
        return QualityVerdict::reject(format!(
            "image too small ({}x{} px, minimum {}x{} px)",
            width, height, config.min_width, config.min_height
        ));
    }

    let luma = image.to_luma8();
    let total = luma.pixels().len().max(1) as f32;
    let (mut dark, mut bright) = (0usize, 0usize);
    for pixel in luma.pixels() {
        let value = pixel.0[0];
        if value < config.dark_threshold {
            dark += 1;
        } else if value > config.bright_threshold {
            bright += 1;
        }
    }

    let dark_ratio = dark as f32 / total;
    if dark_ratio > config.max_dark_ratio {
        return QualityVerdict::reject(format!(
            "image too dark ({:.0}% of pixels nearly black)",
            dark_ratio * 100.0
        ));
    }

    let bright_ratio = bright as f32 / total;
    if bright_ratio > config.max_bright_ratio {
        return QualityVerdict::reject(format!(
            "image overexposed ({:.0}% of pixels nearly white)",
            bright_ratio * 100.0
        ));
    }

    QualityVerdict::pass("ok")
}
