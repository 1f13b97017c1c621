//! DeepSeek provider (OpenAI-compatible Chat Completions, streaming only)

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CompletionProvider, CompletionRequest, ProviderError, SseDecoder, StreamEvent};
use crate::config::AppConfig;

pub struct DeepSeekProvider {
    client: HttpClient,
    api_key: String,
    endpoint: String,
    request_timeout: Duration,
}

impl DeepSeekProvider {
    pub fn new(api_key: impl Into<String>, base_url: &str, request_timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .connect_timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            request_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_key.clone(), &config.base_url, config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// System instruction first, then the conversation in order
    fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage {
            role: "system".into(),
            content: request.system.clone(),
        });
        for turn in &request.messages {
            messages.push(ChatMessage {
                role: turn.role.as_str().into(),
                content: turn.content.clone(),
            });
        }
        messages
    }

    /// Forward text deltas from the SSE body until `[DONE]` or close
    async fn process_sse_stream(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut deltas = 0usize;
        let mut done = false;

        'read: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            for frame in decoder.push(&chunk) {
                if frame.is_done() {
                    done = true;
                    break 'read;
                }
                let Some(content) = frame_content(&frame) else {
                    continue;
                };
                deltas += 1;
                if tx.send(StreamEvent::TextDelta(content)).await.is_err() {
                    debug!("Stream receiver dropped, stopping");
                    return;
                }
            }
        }

        if !done {
            if let Some(content) = decoder.finish().and_then(|f| frame_content(&f)) {
                deltas += 1;
                let _ = tx.send(StreamEvent::TextDelta(content)).await;
            }
        }

        debug!(deltas, "Completion stream finished");
        let _ = tx.send(StreamEvent::Done).await;
    }
}

/// Text carried by one frame; malformed or empty frames carry none
fn frame_content(frame: &super::SseFrame) -> Option<String> {
    if frame.is_done() {
        return None;
    }
    let Some(chunk) = frame.try_parse::<ChatStreamChunk>() else {
        debug!(data = %frame.preview(), "Skipping unparseable stream frame");
        return None;
    };
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn create_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: Self::build_messages(&request),
            stream: true,
            max_tokens: request.max_tokens,
        };

        info!(
            model = %body.model,
            messages = body.messages.len(),
            "Opening completion stream"
        );

        let send = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| ProviderError::Timeout(self.request_timeout.as_secs()))??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("(failed to read body: {})", e));
            return Err(ProviderError::Status { status, body });
        }

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::process_sse_stream(response, tx));

        Ok(rx)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
