//! Nameplate extraction pipeline
//!
//! Quality gate, then the vision chain cheapest first. Each reply is parsed,
//! backfilled from raw text and calibrated; the first attempt that clears the
//! confidence bar wins. If none does, the best attempt is returned anyway so
//! the caller always gets whatever could be read.
//!
//! Failures never surface as `Err`: a rejected image or an exhausted chain is
//! reported through `VisionExtractionResult::error`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::ai::catalog::ProviderDescriptor;
use crate::ai::providers::ProviderError;
use crate::ai::router::{AttemptReport, InferenceRouter, SkipReason};
use crate::config::Settings;
use crate::models::{ExtractionError, VisionExtractionResult, NO_BACKEND, QUALITY_CHECK_BACKEND};
use crate::vision::confidence::{calculate_confidence, calibrate};
use crate::vision::parser::{parse_extraction, EXTRACTION_PROMPT};
use crate::vision::quality::{check_image_quality_blocking, QualityConfig};
use crate::vision::taxonomy;

/// Default acceptance bar
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Default budget for the whole vision chain
pub const DEFAULT_VISION_DEADLINE: Duration = Duration::from_secs(90);

/// Per-request knobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    #[serde(default)]
    pub skip_quality_check: bool,
    /// Overrides the configured acceptance bar
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

pub struct VisionPipeline {
    router: Arc<InferenceRouter>,
    min_confidence: f64,
    deadline: Duration,
    max_tokens: u32,
    quality: QualityConfig,
}

impl VisionPipeline {
    pub fn new(router: Arc<InferenceRouter>) -> Self {
        Self {
            router,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            deadline: DEFAULT_VISION_DEADLINE,
            max_tokens: 1024,
            quality: QualityConfig::default(),
        }
    }

    pub fn from_settings(router: Arc<InferenceRouter>, settings: &Settings) -> Self {
        Self::new(router)
            .with_min_confidence(settings.min_confidence())
            .with_deadline(settings.vision_deadline())
            .with_max_tokens(settings.vision.max_tokens)
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_quality_config(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }

    /// Turn a nameplate photo into a calibrated extraction result
    pub async fn analyze_image(
        &self,
        image_bytes: &[u8],
        options: &AnalyzeOptions,
    ) -> VisionExtractionResult {
        let started = Instant::now();
        let request_id = Uuid::new_v4();

        if !options.skip_quality_check {
            let verdict =
                check_image_quality_blocking(Arc::from(image_bytes), self.quality.clone()).await;
            if !verdict.passed {
                tracing::info!("Image rejected by quality gate: {}", verdict.reason);
                let mut result = VisionExtractionResult::failed(
                    QUALITY_CHECK_BACKEND,
                    ExtractionError::QualityRejected {
                        reason: verdict.reason,
                    },
                );
                result.request_id = request_id;
                result.processing_time_ms = elapsed_ms(started);
                return result;
            }
        }

        let threshold = options.min_confidence.unwrap_or(self.min_confidence);
        let available = self.router.available_providers();
        let deadline = started + self.deadline;
        let mut report = AttemptReport::new();
        let mut total_cost: f64 = 0.0;
        let mut best: Option<VisionExtractionResult> = None;

        for descriptor in self.router.catalog().vision_chain() {
            if !available.contains(&descriptor.backend) {
                report.skip(descriptor, SkipReason::NoCredential);
                continue;
            }
            if !descriptor.accepts_image(image_bytes.len()) {
                report.skip(
                    descriptor,
                    SkipReason::ImageTooLarge {
                        size_bytes: image_bytes.len(),
                        limit_mb: descriptor.max_image_mb,
                    },
                );
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                report.abort(format!("vision deadline of {:?} exceeded", self.deadline));
                break;
            }

            let attempt_started = Instant::now();
            let call = tokio::time::timeout(
                remaining,
                self.router
                    .call_vision(descriptor, image_bytes, EXTRACTION_PROMPT, self.max_tokens),
            )
            .await
            .unwrap_or(Err(ProviderError::Timeout));

            let call = match call {
                Ok(call) => call,
                Err(e) => {
                    report.fail(descriptor, &e);
                    continue;
                }
            };
            report.succeed(descriptor);
            total_cost += call.cost;

            let mut attempt = build_attempt(descriptor, &call.text);
            attempt.cost = call.cost;
            attempt.processing_time_ms = elapsed_ms(attempt_started);
            tracing::debug!(
                "{} read the plate with confidence {:.2}",
                descriptor.label(),
                attempt.confidence
            );

            if attempt.confidence >= threshold {
                tracing::info!(
                    "Accepted {} at confidence {:.2} (threshold {:.2})",
                    descriptor.label(),
                    attempt.confidence,
                    threshold
                );
                return finish(attempt, request_id, started, total_cost);
            }

            let improves = best
                .as_ref()
                .map_or(true, |b| attempt.confidence > b.confidence);
            if improves {
                best = Some(attempt);
            }
        }

        match best {
            Some(best) => {
                tracing::info!(
                    "No backend cleared {:.2}; returning best attempt from {} at {:.2}",
                    threshold,
                    best.backend,
                    best.confidence
                );
                finish(best, request_id, started, total_cost)
            }
            None => {
                let error = ExtractionError::AllBackendsFailed {
                    attempted: report.attempted(),
                    last_error: report.last_error(),
                };
                tracing::warn!("{}", error);
                let mut result = VisionExtractionResult::failed(NO_BACKEND, error);
                result.request_id = request_id;
                result.processing_time_ms = elapsed_ms(started);
                result.cost = total_cost;
                result
            }
        }
    }
}

/// Parse, backfill and calibrate one backend reply
fn build_attempt(descriptor: &ProviderDescriptor, reply: &str) -> VisionExtractionResult {
    let parsed = parse_extraction(reply);

    let mut result =
        VisionExtractionResult::new(descriptor.backend.to_string(), descriptor.model.clone());
    result.manufacturer = parsed.manufacturer;
    result.model_number = parsed.model_number;
    result.serial_number = parsed.serial_number;
    result.fault_code = parsed.fault_code;
    result.equipment_type = parsed.equipment_type;
    result.equipment_subtype = parsed.equipment_subtype;
    result.condition = parsed.condition;
    result.visible_issues = parsed.visible_issues;
    result.specs = parsed.specs;
    result.raw_text = parsed.raw_text;
    result.image_issues = parsed.image_issues;

    taxonomy::backfill(&mut result);

    // an unreadable reply keeps its backfilled fields but never scores
    result.confidence = if parsed.degraded {
        0.0
    } else {
        calibrate(
            parsed.self_confidence,
            calculate_confidence(&result),
            &result.image_issues,
        )
    };
    result
}

/// Stamp totals and normalize the returned result
fn finish(
    mut result: VisionExtractionResult,
    request_id: Uuid,
    started: Instant,
    total_cost: f64,
) -> VisionExtractionResult {
    result.request_id = request_id;
    result.cost = total_cost;
    result.processing_time_ms = elapsed_ms(started);
    result.normalize();
    result
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
