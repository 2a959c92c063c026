//! Scripted in-process providers for router and pipeline tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ai::catalog::BackendKind;
use crate::ai::providers::{
    CompletionRequest, ImagePayload, Provider, ProviderError, ProviderReply, TextStream,
    TokenUsage,
};

#[derive(Clone)]
pub(crate) enum Script {
    Reply {
        text: String,
        usage: Option<TokenUsage>,
    },
    Fail(ProviderError),
    /// Never answers; exercises timeouts
    Hang,
    Fragments(Vec<Result<String, ProviderError>>),
}

pub(crate) struct ScriptedProvider {
    kind: BackendKind,
    script: Script,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(kind: BackendKind, script: Script) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(kind: BackendKind, text: &str) -> Arc<Self> {
        Self::new(
            kind,
            Script::Reply {
                text: text.to_string(),
                usage: None,
            },
        )
    }

    pub fn replying_with_usage(kind: BackendKind, text: &str, usage: TokenUsage) -> Arc<Self> {
        Self::new(
            kind,
            Script::Reply {
                text: text.to_string(),
                usage: Some(usage),
            },
        )
    }

    pub fn failing(kind: BackendKind, error: ProviderError) -> Arc<Self> {
        Self::new(kind, Script::Fail(error))
    }

    pub fn rejecting(kind: BackendKind) -> Arc<Self> {
        Self::failing(
            kind,
            ProviderError::Unauthorized {
                backend: kind.to_string(),
                status: 403,
                message: "PERMISSION_DENIED".to_string(),
            },
        )
    }

    pub fn hanging(kind: BackendKind) -> Arc<Self> {
        Self::new(kind, Script::Hang)
    }

    pub fn streaming(kind: BackendKind, fragments: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Self::new(kind, Script::Fragments(fragments))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }

    async fn run(&self, prompt: &str) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match &self.script {
            Script::Reply { text, usage } => Ok(ProviderReply {
                text: text.clone(),
                usage: *usage,
            }),
            Script::Fail(e) => Err(e.clone()),
            Script::Hang => futures::future::pending().await,
            Script::Fragments(fragments) => Ok(ProviderReply {
                text: fragments
                    .iter()
                    .filter_map(|f| f.as_ref().ok())
                    .cloned()
                    .collect(),
                usage: None,
            }),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn complete(
        &self,
        _model: &str,
        request: &CompletionRequest,
    ) -> Result<ProviderReply, ProviderError> {
        self.run(&request.prompt).await
    }

    async fn stream(
        &self,
        _model: &str,
        request: &CompletionRequest,
    ) -> Result<TextStream, ProviderError> {
        if let Script::Fragments(fragments) = &self.script {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Ok(Box::pin(futures::stream::iter(fragments.clone())));
        }
        let reply = self.run(&request.prompt).await?;
        Ok(Box::pin(futures::stream::iter(vec![Ok(reply.text)])))
    }

    async fn analyze_image(
        &self,
        _model: &str,
        _image: &ImagePayload,
        prompt: &str,
        _max_tokens: u32,
    ) -> Result<ProviderReply, ProviderError> {
        self.run(prompt).await
    }
}
