//! Inference router
//!
//! Single point of dispatch to the interchangeable backends.
//!
//! ## Routing Strategy
//!
//! | Request          | Chain                    | Fallback                        |
//! |------------------|--------------------------|---------------------------------|
//! | Text             | capability tier list     | next backend on any failure     |
//! | Text (streaming) | capability tier list     | only if the stream never started|
//! | Vision           | one descriptor           | none (the pipeline cascades)    |
//!
//! Lists are walked front to back, one backend at a time, so the cheapest
//! backend that answers is always the one that wins. Backends without a
//! configured client are skipped without a network round trip. Every walk is
//! bounded by a per-call timeout and an overall chain deadline.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::{Duration, Instant};

use crate::ai::catalog::{BackendKind, CapabilityTier, Catalog, CatalogError, ProviderDescriptor};
use crate::ai::providers::{
    CompletionRequest, ImagePayload, ProviderError, ProviderRegistry, ProviderReply, TokenUsage,
};
use crate::config::Settings;
use crate::core::utils::word_count;
use crate::models::TextGenerationResult;

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default budget for a whole text fallback walk
pub const DEFAULT_TEXT_DEADLINE: Duration = Duration::from_secs(120);

/// Tokens per word when a backend reports no usage
const TOKENS_PER_WORD: f64 = 1.3;

/// Fragments of a routed stream
pub type RouterStream = Pin<Box<dyn Stream<Item = Result<String, RouterError>> + Send>>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] CatalogError),
    #[error("Failed to build provider clients: {0}")]
    ClientSetup(#[from] ProviderError),
    #[error("All providers failed for {capability} (tried: [{}]){}", attempted.join(", "), last_error.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    AllBackendsFailed {
        capability: String,
        attempted: Vec<String>,
        last_error: Option<String>,
    },
    #[error("Stream from {backend} interrupted: {message}")]
    StreamInterrupted { backend: String, message: String },
}

// ============================================================================
// Attempt bookkeeping
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No client registered for the backend
    NoCredential,
    ImageTooLarge { size_bytes: usize, limit_mb: f64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoCredential => write!(f, "no credential configured"),
            SkipReason::ImageTooLarge {
                size_bytes,
                limit_mb,
            } => write!(f, "image of {} bytes exceeds {} MB limit", size_bytes, limit_mb),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 401/403 style refusal; never worth retrying
    CredentialRejected,
    Transient,
}

impl FailureKind {
    pub fn of(error: &ProviderError) -> Self {
        if error.is_credential_rejection() {
            FailureKind::CredentialRejected
        } else {
            FailureKind::Transient
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
    Failed(FailureKind, String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub backend: BackendKind,
    pub model: String,
    pub outcome: Outcome,
}

impl Attempt {
    pub fn label(&self) -> String {
        format!("{}/{}", self.backend, self.model)
    }

    /// Whether a call was actually issued
    pub fn was_attempted(&self) -> bool {
        !matches!(self.outcome, Outcome::Skipped(_))
    }
}

/// Per-backend outcomes of one chain walk, in walk order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttemptReport {
    attempts: Vec<Attempt>,
    aborted: Option<String>,
}

impl AttemptReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn record(&mut self, descriptor: &ProviderDescriptor, outcome: Outcome) {
        match &outcome {
            Outcome::Success => {}
            Outcome::Skipped(reason) => {
                tracing::debug!("Skipping {}: {}", descriptor.label(), reason)
            }
            Outcome::Failed(FailureKind::CredentialRejected, message) => tracing::warn!(
                "{} rejected the credential, moving on: {}",
                descriptor.label(),
                message
            ),
            Outcome::Failed(FailureKind::Transient, message) => {
                tracing::warn!("{} failed: {}", descriptor.label(), message)
            }
        }
        self.attempts.push(Attempt {
            backend: descriptor.backend,
            model: descriptor.model.clone(),
            outcome,
        });
    }

    pub fn skip(&mut self, descriptor: &ProviderDescriptor, reason: SkipReason) {
        self.record(descriptor, Outcome::Skipped(reason));
    }

    pub fn fail(&mut self, descriptor: &ProviderDescriptor, error: &ProviderError) {
        self.record(
            descriptor,
            Outcome::Failed(FailureKind::of(error), error.to_string()),
        );
    }

    pub fn succeed(&mut self, descriptor: &ProviderDescriptor) {
        self.record(descriptor, Outcome::Success);
    }

    /// Stop the walk early, e.g. when the chain deadline runs out
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Provider chain aborted: {}", reason);
        self.aborted = Some(reason);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Labels of the backends actually called (skips excluded)
    pub fn attempted(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter(|a| a.was_attempted())
            .map(Attempt::label)
            .collect()
    }

    /// The abort reason, else the message of the last failure
    pub fn last_error(&self) -> Option<String> {
        if let Some(reason) = &self.aborted {
            return Some(reason.clone());
        }
        self.attempts.iter().rev().find_map(|a| match &a.outcome {
            Outcome::Failed(_, message) => Some(message.clone()),
            _ => None,
        })
    }

    pub fn into_error(self, capability: impl Into<String>) -> RouterError {
        RouterError::AllBackendsFailed {
            capability: capability.into(),
            attempted: self.attempted(),
            last_error: self.last_error(),
        }
    }
}

// ============================================================================
// Requests and results
// ============================================================================

/// A text request routed through a capability tier
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub tier: CapabilityTier,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, tier: CapabilityTier) -> Self {
        Self {
            prompt: prompt.into(),
            tier,
            max_tokens: 1024,
            temperature: 0.3,
            system_prompt: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    fn completion(&self) -> CompletionRequest {
        let request = CompletionRequest::new(self.prompt.clone(), self.max_tokens, self.temperature);
        match &self.system_prompt {
            Some(system) => request.with_system_prompt(system.clone()),
            None => request,
        }
    }
}

/// Text and realized cost of one vision call
#[derive(Debug, Clone, PartialEq)]
pub struct VisionCall {
    pub text: String,
    pub cost: f64,
}

/// Token estimate for backends that report no usage
pub fn estimate_tokens(text: &str) -> u64 {
    (word_count(text) as f64 * TOKENS_PER_WORD).ceil() as u64
}

/// Cost of a reply, estimating tokens from word counts when usage is missing
fn reply_cost(descriptor: &ProviderDescriptor, prompt: &str, reply: &ProviderReply) -> f64 {
    let usage = reply.usage.unwrap_or_else(|| TokenUsage {
        input_tokens: estimate_tokens(prompt),
        output_tokens: estimate_tokens(&reply.text),
    });
    descriptor.cost_for(usage.input_tokens, usage.output_tokens)
}

// ============================================================================
// Router
// ============================================================================

pub struct InferenceRouter {
    catalog: Catalog,
    registry: ProviderRegistry,
    call_timeout: Duration,
    text_deadline: Duration,
}

impl InferenceRouter {
    pub fn new(catalog: Catalog, registry: ProviderRegistry) -> Self {
        Self {
            catalog,
            registry,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            text_deadline: DEFAULT_TEXT_DEADLINE,
        }
    }

    /// Catalog, clients and timeouts from loaded settings
    pub fn from_settings(settings: &Settings) -> Result<Self, RouterError> {
        let catalog = settings.catalog()?;
        let registry = ProviderRegistry::from_settings(settings)?;
        tracing::info!(
            "Inference router ready with {} backend(s): {:?}",
            registry.available().len(),
            registry.available()
        );
        Ok(Self::new(catalog, registry)
            .with_call_timeout(settings.request_timeout())
            .with_text_deadline(settings.text_deadline()))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_text_deadline(mut self, deadline: Duration) -> Self {
        self.text_deadline = deadline;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Backends with a configured credential
    pub fn available_providers(&self) -> BTreeSet<BackendKind> {
        self.registry.available()
    }

    /// Time left for the next call, or None once the deadline has passed
    fn budget(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(self.call_timeout))
    }

    /// Text completion through a capability tier, cheapest backend first
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<TextGenerationResult, RouterError> {
        let chain = self.catalog.tier(request.tier)?;
        let completion = request.completion();
        let deadline = Instant::now() + self.text_deadline;
        let mut report = AttemptReport::new();

        for descriptor in chain {
            let Some(provider) = self.registry.get(descriptor.backend) else {
                report.skip(descriptor, SkipReason::NoCredential);
                continue;
            };
            let Some(budget) = self.budget(deadline) else {
                report.abort(format!(
                    "chain deadline of {}s exceeded",
                    self.text_deadline.as_secs()
                ));
                break;
            };

            let reply = tokio::time::timeout(budget, provider.complete(&descriptor.model, &completion))
                .await
                .unwrap_or(Err(ProviderError::Timeout));

            match reply {
                Ok(reply) => {
                    report.succeed(descriptor);
                    let prompt = match &completion.system_prompt {
                        Some(system) => format!("{}\n{}", system, completion.prompt),
                        None => completion.prompt.clone(),
                    };
                    let cost = reply_cost(descriptor, &prompt, &reply);
                    tracing::info!(
                        "Generated {} tier text with {} (cost {:.6})",
                        request.tier,
                        descriptor.label(),
                        cost
                    );
                    return Ok(TextGenerationResult {
                        text: reply.text,
                        cost,
                        model: descriptor.model.clone(),
                        backend: descriptor.backend,
                    });
                }
                Err(e) => report.fail(descriptor, &e),
            }
        }

        Err(report.into_error(request.tier.to_string()))
    }

    /// Streamed completion.
    ///
    /// Falls back only while no backend has started streaming. Once one has,
    /// its stream is returned and a later fragment error ends the stream with
    /// `StreamInterrupted`.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> Result<RouterStream, RouterError> {
        let chain = self.catalog.tier(request.tier)?;
        let completion = request.completion();
        let deadline = Instant::now() + self.text_deadline;
        let mut report = AttemptReport::new();

        for descriptor in chain {
            let Some(provider) = self.registry.get(descriptor.backend) else {
                report.skip(descriptor, SkipReason::NoCredential);
                continue;
            };
            let Some(budget) = self.budget(deadline) else {
                report.abort(format!(
                    "chain deadline of {}s exceeded",
                    self.text_deadline.as_secs()
                ));
                break;
            };

            let started = tokio::time::timeout(budget, provider.stream(&descriptor.model, &completion))
                .await
                .unwrap_or(Err(ProviderError::Timeout));

            match started {
                Ok(stream) => {
                    report.succeed(descriptor);
                    tracing::info!("Streaming {} tier text from {}", request.tier, descriptor.label());
                    let backend = descriptor.label();
                    let mut failed = false;
                    let stream = stream
                        .map(move |fragment| {
                            fragment.map_err(|e| RouterError::StreamInterrupted {
                                backend: backend.clone(),
                                message: e.to_string(),
                            })
                        })
                        // the first error is terminal
                        .take_while(move |item| {
                            let keep = !failed;
                            failed = failed || item.is_err();
                            futures::future::ready(keep)
                        });
                    return Ok(Box::pin(stream));
                }
                Err(e) => report.fail(descriptor, &e),
            }
        }

        Err(report.into_error(request.tier.to_string()))
    }

    /// One vision call against one backend. Never falls back.
    pub async fn call_vision(
        &self,
        descriptor: &ProviderDescriptor,
        image_bytes: &[u8],
        prompt: &str,
        max_tokens: u32,
    ) -> Result<VisionCall, ProviderError> {
        let provider = self
            .registry
            .get(descriptor.backend)
            .ok_or_else(|| ProviderError::NotConfigured(descriptor.backend.to_string()))?;

        let image = ImagePayload::from_bytes(image_bytes);
        let reply = tokio::time::timeout(
            self.call_timeout,
            provider.analyze_image(&descriptor.model, &image, prompt, max_tokens),
        )
        .await
        .map_err(|_| ProviderError::Timeout)??;

        let cost = reply_cost(descriptor, prompt, &reply);
        tracing::debug!(
            "Vision call to {} returned {} chars (cost {:.6})",
            descriptor.label(),
            reply.text.len(),
            cost
        );
        Ok(VisionCall {
            text: reply.text,
            cost,
        })
    }
}

impl std::fmt::Debug for InferenceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceRouter")
            .field("available", &self.available_providers())
            .field("call_timeout", &self.call_timeout)
            .field("text_deadline", &self.text_deadline)
            .finish()
    }
}
