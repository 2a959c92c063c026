//! Anthropic Claude Client
//!
//! Supports the Anthropic Messages API. Images are sent as structured
//! base64 `image` content blocks rather than data URIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::streaming::{parse_event, sse_text_stream};
use super::{
    check_status, CompletionRequest, ImagePayload, Provider, ProviderError, ProviderReply,
    TextStream, TokenUsage,
};
use crate::ai::catalog::BackendKind;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl AnthropicClient {
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
                .unwrap_or("https://api.anthropic.com")
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn body(model: &str, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": request.prompt}
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if let Some(system) = &request.system_prompt {
            body["system"] = serde_json::json!(system);
        }
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body);
        if !streaming {
            builder = builder.timeout(self.timeout);
        }
        let response = builder.send().await?;

        check_status(BackendKind::Anthropic, response).await
    }

    async fn read_reply(response: reqwest::Response) -> Result<ProviderReply, ProviderError> {
        let response: AnthropicResponse = response.json().await?;

        let text: String = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse("anthropic".to_string()));
        }

        Ok(ProviderReply {
            text,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }
}

#[async_trait]
impl Provider for AnthropicClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ProviderReply, ProviderError> {
        let response = self.send(&Self::body(model, request, false), false).await?;
        Self::read_reply(response).await
    }

    async fn stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<TextStream, ProviderError> {
        let response = self.send(&Self::body(model, request, true), true).await?;

        Ok(sse_text_stream(BackendKind::Anthropic, response, |event| {
            match event.event.as_str() {
                "content_block_delta" => {
                    let delta: StreamDelta = parse_event(event)?;
                    Ok(delta.delta.text)
                }
                "error" => Err(ProviderError::Stream(event.data.clone())),
                _ => Ok(None),
            }
        }))
    }

    async fn analyze_image(
        &self,
        model: &str,
        image: &ImagePayload,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderReply, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": 0.1,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.mime_type,
                            "data": image.base64
                        }
                    },
                    {
                        "type": "text",
                        "text": prompt
                    }
                ]
            }]
        });

        let response = self.send(&body, false).await?;
        Self::read_reply(response).await
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    delta: DeltaText,
}

#[derive(Debug, Deserialize)]
struct DeltaText {
    #[serde(default)]
    text: Option<String>,
}
