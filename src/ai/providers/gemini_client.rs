//! Gemini client
//! Uses Google's Gemini API for vision and text understanding.
//! Images travel as `inline_data` parts; usage metadata is not always present,
//! in which case the router estimates cost from word counts.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::streaming::{parse_event, sse_text_stream};
use super::{
    check_status, CompletionRequest, ImagePayload, Provider, ProviderError, ProviderReply,
    TextStream, TokenUsage,
};
use crate::ai::catalog::BackendKind;

pub struct GeminiClient {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Image { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiResponse {
    fn first_text(&self) -> Option<String> {
        let candidate = self.candidates.as_ref()?.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }
}

impl GeminiClient {
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            timeout,
            base_url: base_url
                .unwrap_or("https://generativelanguage.googleapis.com")
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn get_api_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    fn text_request(request: &CompletionRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system_prompt.as_ref().map(|system| Content {
                parts: vec![Part::Text {
                    text: system.clone(),
                }],
            }),
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            }),
        }
    }

    async fn send(
        &self,
        url: String,
        request: &GeminiRequest,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request);
        if !streaming {
            builder = builder.timeout(self.timeout);
        }
        let response = builder.send().await?;

        check_status(BackendKind::Gemini, response).await
    }

    async fn generate(
        &self,
        model: &str,
        request: &GeminiRequest,
    ) -> Result<ProviderReply, ProviderError> {
        let response = self
            .send(self.get_api_url(model, "generateContent"), request, false)
            .await?
            .json::<GeminiResponse>()
            .await?;

        if let Some(error) = response.error {
            return Err(ProviderError::APIError {
                status: 200,
                message: error.message,
            });
        }

        let text = response
            .first_text()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse("gemini".to_string()))?;

        Ok(ProviderReply {
            text,
            usage: response.usage_metadata.map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
        })
    }
}

#[async_trait]
impl Provider for GeminiClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ProviderReply, ProviderError> {
        self.generate(model, &Self::text_request(request)).await
    }

    async fn stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<TextStream, ProviderError> {
        let url = format!("{}?alt=sse", self.get_api_url(model, "streamGenerateContent"));
        let response = self.send(url, &Self::text_request(request), true).await?;

        Ok(sse_text_stream(BackendKind::Gemini, response, |event| {
            let chunk: GeminiResponse = parse_event(event)?;
            if let Some(error) = chunk.error {
                return Err(ProviderError::Stream(error.message));
            }
            Ok(chunk.first_text())
        }))
    }

    async fn analyze_image(
        &self,
        model: &str,
        image: &ImagePayload,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderReply, ProviderError> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.base64.clone(),
                        },
                    },
                ],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                temperature: 0.1,
                max_output_tokens: max_tokens,
            }),
        };

        self.generate(model, &request).await
    }
}
