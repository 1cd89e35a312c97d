//! Completion backends

mod debug_wrapper;
mod error;
mod gemini;
mod scripted;
mod types;

pub use debug_wrapper::DebugBackend;
pub use error::LlmError;
pub use gemini::{GeminiProvider, GEMINI_API_BASE};
pub use scripted::{RecordedDispatch, ScriptedBackend};
pub use types::*;

use async_trait::async_trait;

/// A hosted completion API consumed by the orchestrator
///
/// `dispatch` must behave as a pure function of its inputs: the backend keeps
/// no conversation state between calls beyond what `history` carries.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Model identifier requests are sent to
    fn model(&self) -> &str;

    /// Send the full history and tool schemas, receive one model turn
    async fn dispatch(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
        system_instruction: Option<&str>,
    ) -> Result<Dispatched, LlmError>;
}
