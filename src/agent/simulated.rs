//! Stand-in agent used when no agent program is installed

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{AgentError, AgentFactory, DelegatedAgent};

#[derive(Debug, Clone, Default)]
pub struct SimulatedAgentFactory {
    delay: Duration,
}

impl SimulatedAgentFactory {
    /// Agents that take `delay` per run
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl AgentFactory for SimulatedAgentFactory {
    fn create(&self) -> Result<Box<dyn DelegatedAgent>, AgentError> {
        Ok(Box::new(SimulatedAgent { delay: self.delay }))
    }
}

#[derive(Debug)]
pub struct SimulatedAgent {
    delay: Duration,
}

#[async_trait]
impl DelegatedAgent for SimulatedAgent {
    async fn run(&mut self, prompt: &str) -> Result<(), AgentError> {
        info!(target: "open_manus::agent", prompt, "Simulated agent received request");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        info!(target: "open_manus::agent", "Simulated agent finished");
        Ok(())
    }

    async fn cleanup(&mut self) {
        info!(target: "open_manus::agent", "Simulated agent cleaned up");
    }
}
