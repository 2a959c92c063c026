//! OpenAI Compatible Client
//!
//! Speaks the OpenAI chat-completions protocol. Used for OpenAI itself and for
//! the backends that mirror it (Groq, DeepSeek) behind a different base URL.
//! Images travel as `data:` URIs inside an `image_url` content part.

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

pub struct OpenAIClient {
    client: Client,
    kind: BackendKind,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(
        kind: BackendKind,
        api_key: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.unwrap_or_else(|| Self::default_base_url(kind));

        let client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            kind,
            api_key: api_key.to_string(),
            timeout,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn default_base_url(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::Groq => "https://api.groq.com/openai/v1",
            BackendKind::DeepSeek => "https://api.deepseek.com/v1",
            _ => "https://api.openai.com/v1",
        }
    }

    fn messages(request: &CompletionRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));
        messages
    }

    /// Streams are only bounded by the connect timeout; a long answer may
    /// legitimately take longer than a whole blocking call is allowed to.
    async fn send(
        &self,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body);
        if !streaming {
            builder = builder.timeout(self.timeout);
        }
        let response = builder.send().await?;

        check_status(self.kind, response).await
    }

    async fn read_reply(&self, response: reqwest::Response) -> Result<ProviderReply, ProviderError> {
        let response: OpenAIResponse = response.json().await?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::EmptyResponse(self.kind.to_string()))?;

        Ok(ProviderReply {
            text,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl Provider for OpenAIClient {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<ProviderReply, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "messages": Self::messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self.send(&body, false).await?;
        self.read_reply(response).await
    }

    async fn stream(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<TextStream, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "messages": Self::messages(request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });

        let response = self.send(&body, true).await?;

        Ok(sse_text_stream(self.kind, response, |event| {
            if event.data.trim() == "[DONE]" {
                return Ok(None);
            }
            let chunk: OpenAIStreamChunk = parse_event(event)?;
            if let Some(error) = chunk.error {
                return Err(ProviderError::Stream(error.message));
            }
            Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content))
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
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt},
                        {
                            "type": "image_url",
                            "image_url": {"url": image.data_uri()}
                        }
                    ]
                }
            ],
            "max_tokens": max_tokens,
            "temperature": 0.1,
        });

        let response = self.send(&body, false).await?;
        self.read_reply(response).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    /// In-band failure after the stream has started
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(kind: BackendKind, server: &MockServer) -> OpenAIClient {
        OpenAIClient::new(kind, "test-key", Some(&server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_default_base_urls() {
        let groq = OpenAIClient::new(BackendKind::Groq, "k", None, Duration::from_secs(1)).unwrap();
        assert!(groq.base_url.contains("groq.com"));

        let openai = OpenAIClient::new(BackendKind::OpenAI, "k", None, Duration::from_secs(1)).unwrap();
        assert_eq!(openai.base_url, "https://api.openai.com/v1");
        assert_eq!(openai.kind(), BackendKind::OpenAI);
    }

    #[tokio::test]
    async fn test_complete_reports_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Check the DC bus."}}],
                "usage": {"prompt_tokens": 120, "completion_tokens": 30}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(BackendKind::OpenAI, &server)
            .complete("gpt-4o-mini", &CompletionRequest::new("F0001?", 256, 0.2))
            .await
            .unwrap();

        assert_eq!(reply.text, "Check the DC bus.");
        assert_eq!(
            reply.usage,
            Some(TokenUsage {
                input_tokens: 120,
                output_tokens: 30
            })
        );
    }

    #[tokio::test]
    async fn test_forbidden_is_credential_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = client(BackendKind::Groq, &server)
            .complete("llama", &CompletionRequest::new("hi", 16, 0.0))
            .await
            .unwrap_err();

        assert!(err.is_credential_rejection());
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(BackendKind::DeepSeek, &server)
            .complete("deepseek-chat", &CompletionRequest::new("hi", 16, 0.0))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::APIError {
                status: 503,
                message: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_vision_embeds_data_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"manufacturer\": \"ABB\"}"}}]
            })))
            .mount(&server)
            .await;

        let image = ImagePayload::from_bytes(b"jpeg-ish bytes");
        let reply = client(BackendKind::OpenAI, &server)
            .analyze_image("gpt-4o", &image, "read the plate", 512)
            .await
            .unwrap();
        assert_eq!(reply.text, "{\"manufacturer\": \"ABB\"}");
        assert!(reply.usage.is_none());

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let url = body["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_stream_yields_fragments() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Reset \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"the drive.\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let stream = client(BackendKind::OpenAI, &server)
            .stream("gpt-4o-mini", &CompletionRequest::new("hi", 64, 0.3))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments, vec!["Reset ".to_string(), "the drive.".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_surfaces_in_band_error() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Reset \"}}]}\n\n",
            "data: {\"error\":{\"message\":\"upstream overloaded\",\"type\":\"server_error\"}}\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let stream = client(BackendKind::Groq, &server)
            .stream("llama", &CompletionRequest::new("hi", 64, 0.3))
            .await
            .unwrap();
        let items: Vec<Result<String, ProviderError>> = stream.collect().await;

        assert_eq!(
            items,
            vec![
                Ok("Reset ".to_string()),
                Err(ProviderError::Stream("upstream overloaded".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_slow_reply_times_out_but_stream_does_not() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Check \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"the fuse.\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse)
                    .set_delay(Duration::from_millis(600)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "choices": [{"message": {"content": "late"}}]
                    }))
                    .set_delay(Duration::from_millis(600)),
            )
            .mount(&server)
            .await;

        let client = OpenAIClient::new(
            BackendKind::Groq,
            "test-key",
            Some(&server.uri()),
            Duration::from_millis(200),
        )
        .unwrap();
        let request = CompletionRequest::new("hi", 64, 0.3);

        let err = client.complete("llama", &request).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout);

        let stream = client.stream("llama", &request).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "Check the fuse.");
    }
}
