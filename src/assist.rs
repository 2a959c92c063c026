//! Troubleshooting assistant
//! Answers a technician's question about a piece of equipment identified from
//! its nameplate, routed through the text tiers.

use std::sync::Arc;

use crate::ai::catalog::CapabilityTier;
use crate::ai::router::{GenerateRequest, InferenceRouter, RouterError, RouterStream};
use crate::models::{TextGenerationResult, VisionExtractionResult};

/// System prompt for field-service answers
pub const TECHNICIAN_SYSTEM_PROMPT: &str = "You are an experienced industrial maintenance technician. \
Answer for someone standing in front of the equipment: short numbered steps, \
name the parameter or terminal to check, and call out lockout/tagout or arc-flash \
hazards before any step that requires opening an enclosure. If the nameplate \
data is not enough to answer safely, say what else you need.";

pub struct TroubleshootingAssistant {
    router: Arc<InferenceRouter>,
    max_tokens: u32,
}

impl TroubleshootingAssistant {
    pub fn new(router: Arc<InferenceRouter>) -> Self {
        Self {
            router,
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Answer a question about the equipment in `result`
    pub async fn answer(
        &self,
        result: &VisionExtractionResult,
        question: &str,
    ) -> Result<TextGenerationResult, RouterError> {
        let request = self.request(result, question);
        tracing::info!(
            "Answering question on {} tier for {}",
            request.tier,
            result.manufacturer.as_deref().unwrap_or("unidentified equipment")
        );
        self.router.generate(&request).await
    }

    /// Streaming variant of [`answer`](Self::answer)
    pub async fn answer_stream(
        &self,
        result: &VisionExtractionResult,
        question: &str,
    ) -> Result<RouterStream, RouterError> {
        let request = self.request(result, question);
        self.router.generate_stream(&request).await
    }

    fn request(&self, result: &VisionExtractionResult, question: &str) -> GenerateRequest {
        GenerateRequest::new(build_prompt(result, question), tier_for(result))
            .with_max_tokens(self.max_tokens)
            .with_system_prompt(TECHNICIAN_SYSTEM_PROMPT)
    }
}

/// Fault diagnosis needs the stronger tier
pub fn tier_for(result: &VisionExtractionResult) -> CapabilityTier {
    if result.fault_code.is_some() {
        CapabilityTier::Complex
    } else {
        CapabilityTier::Moderate
    }
}

/// Equipment context followed by the question
pub fn build_prompt(result: &VisionExtractionResult, question: &str) -> String {
    let mut context = Vec::new();

    let identity = [
        ("Manufacturer", &result.manufacturer),
        ("Model", &result.model_number),
        ("Serial", &result.serial_number),
        ("Equipment type", &result.equipment_type),
        ("Subtype", &result.equipment_subtype),
        ("Active fault code", &result.fault_code),
        ("Condition", &result.condition),
        ("Visible issues", &result.visible_issues),
    ];
    for (label, value) in identity {
        if let Some(value) = value {
            context.push(format!("- {}: {}", label, value));
        }
    }

    let specs = &result.specs;
    let ratings = [
        ("Voltage", &specs.voltage),
        ("Current", &specs.current),
        ("Horsepower", &specs.horsepower),
        ("Phase", &specs.phase),
        ("Frequency", &specs.frequency),
    ];
    for (label, value) in ratings {
        if let Some(value) = value {
            context.push(format!("- {}: {}", label, value));
        }
    }
    for (key, value) in &specs.additional {
        context.push(format!("- {}: {}", key, value));
    }

    if context.is_empty() && !result.raw_text.is_empty() {
        context.push(format!("- Nameplate text: {}", result.raw_text));
    }

    let equipment = if context.is_empty() {
        "The equipment could not be identified from its nameplate.".to_string()
    } else {
        format!("Equipment from the nameplate:\n{}", context.join("\n"))
    };

    format!("{}\n\nQuestion: {}", equipment, question.trim())
}
