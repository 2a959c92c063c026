//! AI Provider Trait and Factory
//!
//! Defines a unified interface over the inference backends so the router can
//! treat them as interchangeable. Each adapter owns its backend's request
//! encoding (how the image is embedded, how usage is reported); the router
//! only ever sees `ProviderReply`.
//!
//! Supported backends:
//! - Groq, DeepSeek, OpenAI (OpenAI chat-completions protocol)
//! - Google Gemini
//! - Anthropic (Claude)

use async_trait::async_trait;
use base64::Engine;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::catalog::BackendKind;
use crate::config::Settings;

pub mod anthropic_client;
pub mod gemini_client;
pub mod openai_client;
pub mod streaming;

pub use anthropic_client::AnthropicClient;
pub use gemini_client::GeminiClient;
pub use openai_client::OpenAIClient;

/// Lazy, finite sequence of generated text fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

// ============================================================================
// Provider Trait
// ============================================================================

#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this client talks to
    fn kind(&self) -> BackendKind;

    /// Single text completion
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ProviderReply, ProviderError>;

    /// Start a streamed completion. Returns once the backend has accepted the request.
    async fn stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<TextStream, ProviderError>;

    /// Analyze an image (if vision supported)
    async fn analyze_image(
        &self,
        _model: &str,
        _image: &ImagePayload,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::VisionNotSupported(self.kind().to_string()))
    }
}

// ============================================================================
// Provider Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens,
            temperature,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Token accounting as reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// What a backend handed back: the text and, when reported, its usage
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// An image ready for the wire: base64 data plus its MIME type
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub base64: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

impl ImagePayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mime_type = image::guess_format(bytes)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| "image/jpeg".to_string());
        Self {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type,
            size_bytes: bytes.len(),
        }
    }

    /// `data:` URI form used by the OpenAI protocol
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {0} not configured")]
    NotConfigured(String),
    #[error("Credential rejected by {backend} (status {status}): {message}")]
    Unauthorized {
        backend: String,
        status: u16,
        message: String,
    },
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("API error (status {status}): {message}")]
    APIError { status: u16, message: String },
    #[error("Provider {0} does not support vision")]
    VisionNotSupported(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("No content in response from {0}")]
    EmptyResponse(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Request timed out")]
    Timeout,
}

impl ProviderError {
    /// Permission-denied / forbidden: the backend will not accept this credential
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, ProviderError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidRequest(e.to_string())
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::InvalidRequest(e.to_string())
    }
}

/// Markers some backends use in an error body for a bad key, whatever the status
const CREDENTIAL_REJECTION_MARKERS: [&str; 3] =
    ["PERMISSION_DENIED", "API_KEY_INVALID", "invalid_api_key"];

/// Turn a non-success HTTP response into the matching `ProviderError`
pub(crate) async fn check_status(
    backend: BackendKind,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let code = status.as_u16();
    let rejected = code == 401
        || code == 403
        || CREDENTIAL_REJECTION_MARKERS
            .iter()
            .any(|marker| text.contains(marker));

    if rejected {
        return Err(ProviderError::Unauthorized {
            backend: backend.to_string(),
            status: code,
            message: text,
        });
    }
    if code == 429 {
        return Err(ProviderError::RateLimited(text));
    }
    Err(ProviderError::APIError {
        status: code,
        message: text,
    })
}

// ============================================================================
// Provider Factory
// ============================================================================

/// Per-client HTTP settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub base_url: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            base_url: None,
        }
    }
}

pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a client for a backend
    pub fn create(
        kind: BackendKind,
        api_key: &str,
        options: &ClientOptions,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(kind.to_string()));
        }
        let base_url = options.base_url.as_deref();
        match kind {
            BackendKind::Groq | BackendKind::DeepSeek | BackendKind::OpenAI => Ok(Arc::new(
                OpenAIClient::new(kind, api_key, base_url, options.timeout)?,
            )),
            BackendKind::Anthropic => Ok(Arc::new(AnthropicClient::new(
                api_key,
                base_url,
                options.timeout,
            )?)),
            BackendKind::Gemini => Ok(Arc::new(GeminiClient::new(
                api_key,
                base_url,
                options.timeout,
            )?)),
        }
    }
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Long-lived client handles, one per backend with a configured credential.
///
/// Built once at start-up and shared by reference; read-only afterwards, so
/// concurrent requests can use the same handles.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<BackendKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client for every backend that has a credential
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        for kind in BackendKind::ALL {
            let Some(api_key) = settings.credential(kind) else {
                tracing::debug!("No credential for {}, backend unavailable", kind);
                continue;
            };
            let options = ClientOptions {
                timeout: settings.request_timeout(),
                base_url: settings.endpoint(kind),
            };
            registry.register(ProviderFactory::create(kind, &api_key, &options)?);
            tracing::info!("Registered {} backend", kind);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn Provider>> {
        self.providers.get(&kind)
    }

    /// Backends with a configured client
    pub fn available(&self) -> BTreeSet<BackendKind> {
        self.providers.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("available", &self.available())
            .finish()
    }
}
