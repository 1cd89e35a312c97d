//! Conversation state and the tool-calling turn loop

mod context;
mod session;

pub use context::{Checkpoint, ConversationStore};
pub use session::{AgentResponse, Session, ToolCallLog, TurnEvent, DEFAULT_MAX_TOOL_ROUNDS};
