//! Streaming completion providers
//!
//! A provider turns a system instruction plus the conversation so far into a
//! channel of text fragments. DeepSeek's OpenAI-compatible Chat Completions
//! API is the production backend.

mod deepseek;
mod sse;

pub use deepseek::DeepSeekProvider;
pub use sse::{SseDecoder, SseFrame};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::transcript::ConversationTurn;

/// Everything needed to open one completion stream
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ConversationTurn>,
    pub max_tokens: Option<u32>,
}

/// Events produced while a completion streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    /// Transport failure after the stream opened; no further deltas follow
    Error(String),
    Done,
}

/// Failure to open a completion stream
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key is not configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streaming completion
    async fn create_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
