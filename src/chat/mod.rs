//! Chat with the CFO assistant
//!
//! - `engine`: turn loop over a streaming completion
//! - `provider`: completion backends
//! - `session`: per-conversation state and the busy flag
//! - `transcript`: turn model
//! - `prompt`: system instruction

pub mod engine;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod transcript;

pub use engine::{ChatEngine, EngineConfig, STREAM_ERROR_PREFIX, TOOL_RESULT_PREFIX};
pub use session::{ChatSession, TurnPhase, TurnUpdate};
pub use transcript::{ConversationTurn, Role, Transcript};
