//! Delegated agent
//!
//! The agent is an opaque asynchronous worker: construct it, `run` one
//! prompt, then `cleanup`. Two implementations ship:
//! - [`ProcessAgent`]: spawns the configured agent program with the prompt
//! - [`SimulatedAgent`]: logs the request and succeeds, for offline use

mod process;
mod simulated;

pub use process::{ProcessAgent, ProcessAgentFactory, resolve_program};
pub use simulated::{SimulatedAgent, SimulatedAgentFactory};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AgentMode, AppConfig};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent program '{0}' not found")]
    ProgramNotFound(String),

    #[error("failed to start agent: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("agent exited with {0}")]
    Exit(String),

    #[error("agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// One agent instance, used for a single request
#[async_trait]
pub trait DelegatedAgent: Send {
    /// Carry out `prompt` to completion
    async fn run(&mut self, prompt: &str) -> Result<(), AgentError>;

    /// Release anything `run` left behind; must be safe after a failed run
    async fn cleanup(&mut self);
}

/// Builds a fresh agent per tool request
pub trait AgentFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn DelegatedAgent>, AgentError>;
}

/// Factory selected by `ASKCFO_AGENT_MODE`
pub fn factory_from_config(config: &AppConfig) -> Arc<dyn AgentFactory> {
    match config.agent_mode {
        AgentMode::Process => Arc::new(ProcessAgentFactory::new(
            config.agent_program.clone(),
            config.agent_args.clone(),
            config.agent_workdir.clone(),
        )),
        AgentMode::Simulated => Arc::new(SimulatedAgentFactory::default()),
    }
}
