//! Conversation stream engine
//!
//! Drives one turn: append the user's message, stream the completion into the
//! trailing assistant turn, then post-process the full reply (directive
//! extraction, optional tool dispatch) and emit the final transcript.
//!
//! Every change is emitted as a [`TurnUpdate`] in order; the last update of a
//! turn always has `is_generating == false`.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::prompt::CFO_SYSTEM_PROMPT;
use super::provider::{CompletionProvider, CompletionRequest, StreamEvent};
use super::session::{ChatSession, TurnPhase, TurnUpdate};
use crate::config::AppConfig;
use crate::gateway::{ToolDispatcher, ToolError};
use crate::protocol::DirectiveCodec;

/// Separator between the reply and the tool outcome
pub const TOOL_RESULT_PREFIX: &str = "\n\n[工具执行结果]: ";

/// Prefix of the assistant turn written when the completion cannot start
pub const STREAM_ERROR_PREFIX: &str = "CFO：接口调用异常：";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
    /// Delay after each streamed update; zero disables it
    pub pacing: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".into(),
            max_tokens: Some(512),
            system_prompt: CFO_SYSTEM_PROMPT.into(),
            pacing: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: Some(config.max_tokens),
            system_prompt: CFO_SYSTEM_PROMPT.into(),
            pacing: config.stream_pacing(),
        }
    }
}

#[derive(Clone)]
pub struct ChatEngine {
    provider: Arc<dyn CompletionProvider>,
    dispatcher: Arc<dyn ToolDispatcher>,
    codec: DirectiveCodec,
    config: Arc<EngineConfig>,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        codec: DirectiveCodec,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            codec,
            config: Arc::new(config),
        }
    }

    pub fn codec(&self) -> &DirectiveCodec {
        &self.codec
    }

    /// Submit `message` to `session` and stream the resulting updates
    ///
    /// A submission while the session is generating yields a single update
    /// with the transcript untouched and the message handed back.
    pub fn respond(
        &self,
        session: Arc<ChatSession>,
        message: impl Into<String>,
    ) -> impl Stream<Item = TurnUpdate> + Send + 'static {
        let engine = self.clone();
        let message = message.into();

        async_stream::stream! {
            let Some((epoch, mut transcript)) = session.try_begin() else {
                info!(session_id = %session.id(), "Session is generating, ignoring submission");
                yield TurnUpdate {
                    transcript: session.transcript(),
                    is_generating: session.is_generating(),
                    input: message,
                };
                return;
            };

            transcript.push_user(message.as_str());
            session.publish(epoch, &transcript);
            session.set_phase(epoch, TurnPhase::Streaming);

            let request = CompletionRequest {
                model: engine.config.model.clone(),
                system: engine.config.system_prompt.clone(),
                messages: transcript.turns().to_vec(),
                max_tokens: engine.config.max_tokens,
            };

            let mut events = match engine.provider.create_stream(request).await {
                Ok(rx) => ReceiverStream::new(rx),
                Err(e) => {
                    error!(
                        session_id = %session.id(),
                        provider = engine.provider.name(),
                        error = %e,
                        "Failed to open completion stream"
                    );
                    transcript.push_assistant(format!("{}{}", STREAM_ERROR_PREFIX, e));
                    session.publish(epoch, &transcript);
                    session.finish(epoch);
                    yield TurnUpdate {
                        transcript,
                        is_generating: false,
                        input: String::new(),
                    };
                    return;
                }
            };

            let mut reply = String::new();
            while let Some(event) = events.next().await {
                match event {
                    StreamEvent::TextDelta(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        reply.push_str(&text);
                        transcript.set_reply(reply.as_str());
                        session.publish(epoch, &transcript);
                        yield TurnUpdate {
                            transcript: transcript.clone(),
                            is_generating: true,
                            input: String::new(),
                        };
                        if !engine.config.pacing.is_zero() {
                            tokio::time::sleep(engine.config.pacing).await;
                        }
                    }
                    StreamEvent::Error(e) => {
                        warn!(session_id = %session.id(), error = %e, "Completion stream broke off");
                        break;
                    }
                    StreamEvent::Done => break,
                }
            }

            session.set_phase(epoch, TurnPhase::Finalizing);
            let final_text = engine.finalize(&reply).await;
            transcript.set_reply(final_text);
            session.publish(epoch, &transcript);
            session.finish(epoch);

            yield TurnUpdate {
                transcript,
                is_generating: false,
                input: String::new(),
            };
        }
    }

    /// Run a whole turn and return its last update
    pub async fn submit(&self, session: Arc<ChatSession>, message: impl Into<String>) -> Option<TurnUpdate> {
        let stream = self.respond(session, message);
        futures::pin_mut!(stream);
        let mut last = None;
        while let Some(update) = stream.next().await {
            last = Some(update);
        }
        last
    }

    /// Extract the directive and splice in the tool outcome when it is active
    async fn finalize(&self, reply: &str) -> String {
        let preview: String = reply.chars().take(100).collect();
        debug!(chars = reply.chars().count(), preview = %preview, "Processing reply");

        let extraction = self.codec.extract(reply);
        if !extraction.directive.active {
            return extraction.cleaned;
        }

        let dispatcher = self.dispatcher.clone();
        let payload = extraction.directive.payload;
        let outcome = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&payload)).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Tool dispatch task failed");
                ToolError::Worker(e.to_string()).to_string()
            }
        };

        format!("{}{}{}", extraction.cleaned, TOOL_RESULT_PREFIX, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::provider::ProviderError;
    use crate::chat::transcript::Role;
    use crate::protocol::HideToggle;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ScriptedProvider {
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn create_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
            let (tx, rx) = mpsc::channel(16);
            for chunk in &self.chunks {
                tx.send(StreamEvent::TextDelta(chunk.to_string())).await.unwrap();
            }
            tx.send(StreamEvent::Done).await.unwrap();
            Ok(rx)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        payloads: Mutex<Vec<String>>,
    }

    impl ToolDispatcher for RecordingDispatcher {
        fn dispatch(&self, payload: &str) -> String {
            self.payloads.lock().unwrap().push(payload.to_string());
            "done".into()
        }
    }

    fn engine(chunks: Vec<&'static str>, dispatcher: Arc<RecordingDispatcher>) -> ChatEngine {
        ChatEngine::new(
            Arc::new(ScriptedProvider { chunks }),
            dispatcher,
            DirectiveCodec::new(HideToggle::new(false)),
            EngineConfig {
                pacing: Duration::ZERO,
                ..EngineConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_stream_appends_empty_reply() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let session = Arc::new(ChatSession::new());
        let last = engine(vec![], dispatcher)
            .submit(session.clone(), "Hello")
            .await
            .unwrap();

        assert_eq!(last.transcript.len(), 2);
        assert_eq!(last.transcript.turns()[1].role, Role::Assistant);
        assert_eq!(last.transcript.turns()[1].content, "");
        assert!(session.transcript().is_balanced());
    }

    #[tokio::test]
    async fn test_inactive_directive_skips_dispatch() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let last = engine(vec!["不需要。", "[[TOOLS:FALSE][无]]"], dispatcher.clone())
            .submit(Arc::new(ChatSession::new()), "利润表怎么看")
            .await
            .unwrap();

        assert_eq!(last.transcript.last().unwrap().content, "不需要。[[TOOLS:FALSE][无]]");
        assert!(dispatcher.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_directive_dispatches_payload() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let last = engine(vec!["Sure.", "[[TOOLS:TRUE][download X]]"], dispatcher.clone())
            .submit(Arc::new(ChatSession::new()), "get X")
            .await
            .unwrap();

        assert_eq!(
            last.transcript.last().unwrap().content,
            "Sure.[[TOOLS:TRUE][download X]]\n\n[工具执行结果]: done"
        );
        assert_eq!(*dispatcher.payloads.lock().unwrap(), vec!["download X".to_string()]);
    }
}
