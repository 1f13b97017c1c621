//! Tool invocation gateway
//!
//! Turns a directive payload into a finished agent run and a line of text for
//! the transcript. The call is synchronous and bounded: the agent runs on an
//! isolated worker and the caller waits no longer than the timeout.
//!
//! While the agent runs, its log namespaces are bridged into the host's sinks;
//! the bridge is released on every return path.

mod worker;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::agent::{AgentError, AgentFactory};
use crate::logging::{AGENT_TARGETS, LoggingBridge};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Text returned when the agent completes
pub const TOOL_SUCCESS: &str = "工具使用已经完毕，请参考控制台获悉具体操作内容和结果。";

/// Reasons a tool request produced no successful run
///
/// `Display` is the text spliced into the transcript.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("工具请求内容为空，无法处理")]
    EmptyRequest,

    #[error("工具初始化失败: {0}")]
    Init(#[from] AgentError),

    #[error("工具执行失败: {0}")]
    Execution(String),

    #[error("工具执行超时（{}秒），已停止等待", format_secs(.0))]
    Timeout(Duration),

    #[error("工具处理出错: {0}")]
    Worker(String),
}

/// Whole seconds print without a fraction; shorter waits keep theirs
fn format_secs(timeout: &Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        return timeout.as_secs().to_string();
    }
    let secs = format!("{:.3}", timeout.as_secs_f64());
    secs.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Anything that can answer a tool payload with text
///
/// Implementations block; async callers go through `spawn_blocking`.
pub trait ToolDispatcher: Send + Sync {
    fn dispatch(&self, payload: &str) -> String;
}

pub struct ToolGateway {
    factory: Arc<dyn AgentFactory>,
    bridge: Option<LoggingBridge>,
    logger_names: Vec<String>,
    timeout: Duration,
}

impl ToolGateway {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            bridge: None,
            logger_names: AGENT_TARGETS.iter().map(|s| s.to_string()).collect(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Route the agent's loggers into the host sinks during each run
    pub fn with_bridge(mut self, bridge: LoggingBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_logger_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logger_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the agent on `payload` and describe the outcome as text
    pub fn invoke(&self, payload: &str, timeout: Duration) -> String {
        match self.try_invoke(payload, timeout) {
            Ok(()) => TOOL_SUCCESS.to_string(),
            Err(e) => e.to_string(),
        }
    }

    /// Same as [`invoke`](Self::invoke) with the outcome kept typed
    pub fn try_invoke(&self, payload: &str, timeout: Duration) -> Result<(), ToolError> {
        info!(payload = %payload, "Received tool request");

        if payload.trim().is_empty() {
            warn!("Received empty tool request");
            return Err(ToolError::EmptyRequest);
        }

        let _bridge = self
            .bridge
            .as_ref()
            .map(|b| b.scoped(self.logger_names.iter().cloned()));

        let agent = self.factory.create().map_err(|e| {
            error!(error = %e, "Failed to initialize agent");
            ToolError::from(e)
        })?;

        info!(timeout = ?timeout, "Submitting request to agent");
        let result = worker::run_isolated(agent, payload.to_string(), timeout);

        match &result {
            Ok(()) => info!("Agent run completed"),
            Err(e) => error!(error = %e, "Agent run did not complete"),
        }
        result
    }
}

impl ToolDispatcher for ToolGateway {
    fn dispatch(&self, payload: &str) -> String {
        self.invoke(payload, self.timeout)
    }
}
