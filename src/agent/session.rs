//! Tool-calling turn orchestration
//!
//! One `run_turn` call:
//! 1. Appends the user turn and dispatches the full history with tool definitions
//! 2. If the reply requests tools and the round budget allows, executes every
//!    request in order, appends the results as one user turn, and dispatches again
//! 3. Returns the last model turn; tool calls left over once the budget is
//!    spent are reported, not executed

use super::{Checkpoint, ConversationStore};
use crate::llm::{CompletionBackend, LlmError, TokenUsage, Turn};
use crate::tools::ToolExecutor;
use std::sync::Arc;
use tracing::Instrument;

/// Default number of tool rounds per user input (two dispatches)
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 1;

/// Progress notifications emitted while a turn runs
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Dispatching { dispatch: usize },
    ToolCall { name: String, args: serde_json::Value },
    ToolResult { name: String, success: bool, preview: String },
    RoundLimitReached { unanswered: usize },
}

type Observer = dyn Fn(&TurnEvent) + Send + Sync;

/// Log entry for a tool call made during a turn
#[derive(Debug, Clone)]
pub struct ToolCallLog {
    pub tool: String,
    pub args: serde_json::Value,
    pub result_preview: String,
    pub success: bool,
}

/// Outcome of one `run_turn`
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Final model turn, already appended to the history
    pub turn: Turn,
    pub dispatches: usize,
    pub tool_rounds: usize,
    pub tool_calls: Vec<ToolCallLog>,
    /// Tool calls in the final turn that were not executed because the round limit was hit
    pub unanswered_tool_calls: usize,
    pub usage: Option<TokenUsage>,
}

impl AgentResponse {
    /// Text of the final turn, empty if the model only requested tools
    pub fn text(&self) -> String {
        self.turn.text().unwrap_or_default()
    }
}

/// A conversation with one backend and one tool executor
pub struct Session {
    id: String,
    backend: Arc<dyn CompletionBackend>,
    executor: Arc<ToolExecutor>,
    system_instruction: Option<String>,
    max_tool_rounds: usize,
    store: ConversationStore,
    observer: Option<Arc<Observer>>,
}

impl Session {
    pub fn new(backend: Arc<dyn CompletionBackend>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            backend,
            executor,
            system_instruction: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            store: ConversationStore::new(),
            observer: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Receive progress events (dispatches, tool calls, results) as they happen
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TurnEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    pub fn history(&self) -> &[Turn] {
        self.store.turns()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.store.checkpoint()
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) -> usize {
        self.store.rollback(checkpoint)
    }

    /// Run one user input to a final model turn
    ///
    /// Backend errors propagate as-is and leave already appended turns in
    /// place; see `run_turn_atomic` for the all-or-nothing variant.
    pub async fn run_turn(&mut self, user_text: &str) -> Result<AgentResponse, LlmError> {
        let span = tracing::info_span!("turn", session = %self.id, model = %self.backend.model());
        self.drive_turn(user_text).instrument(span).await
    }

    async fn drive_turn(&mut self, user_text: &str) -> Result<AgentResponse, LlmError> {
        self.store.push(Turn::user(user_text));

        let tools = self.executor.registry().describe_all();
        let mut dispatches = 0;
        let mut tool_rounds = 0;
        let mut tool_calls = Vec::new();
        let mut usage: Option<TokenUsage> = None;

        loop {
            tracing::info!(
                dispatch = dispatches + 1,
                history = self.store.len(),
                "Dispatching to {}",
                self.backend.name()
            );
            self.emit(TurnEvent::Dispatching {
                dispatch: dispatches + 1,
            });
            let dispatched = self
                .backend
                .dispatch(
                    self.store.turns(),
                    &tools,
                    self.system_instruction.as_deref(),
                )
                .await?;
            dispatches += 1;

            if let Some(u) = &dispatched.usage {
                usage.get_or_insert_with(TokenUsage::default).add(u);
            }

            let turn = dispatched.turn;
            self.store.push(turn.clone());

            let requests: Vec<_> = turn.tool_calls().cloned().collect();
            if requests.is_empty() {
                return Ok(AgentResponse {
                    turn,
                    dispatches,
                    tool_rounds,
                    tool_calls,
                    unanswered_tool_calls: 0,
                    usage,
                });
            }

            if tool_rounds >= self.max_tool_rounds {
                tracing::warn!(
                    "Tool round limit ({}) reached; {} tool call(s) left unexecuted",
                    self.max_tool_rounds,
                    requests.len()
                );
                self.emit(TurnEvent::RoundLimitReached {
                    unanswered: requests.len(),
                });
                return Ok(AgentResponse {
                    turn,
                    dispatches,
                    tool_rounds,
                    tool_calls,
                    unanswered_tool_calls: requests.len(),
                    usage,
                });
            }

            tool_rounds += 1;
            tracing::info!(round = tool_rounds, "Executing {} tool call(s)", requests.len());

            let mut results = Vec::with_capacity(requests.len());
            for call in &requests {
                self.emit(TurnEvent::ToolCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                });
                let result = self.executor.execute(&call.name, &call.arguments).await;
                let preview = truncate_preview(&result.response.to_value().to_string(), 200);
                tracing::debug!(tool = %call.name, "Tool result: {}", preview);
                self.emit(TurnEvent::ToolResult {
                    name: call.name.clone(),
                    success: !result.is_error(),
                    preview: preview.clone(),
                });
                tool_calls.push(ToolCallLog {
                    tool: call.name.clone(),
                    args: call.arguments.clone(),
                    result_preview: preview,
                    success: !result.is_error(),
                });
                results.push(result);
            }

            self.store.push(Turn::tool_results(results));
        }
    }

    /// `run_turn`, but a failed turn leaves the history exactly as it was
    pub async fn run_turn_atomic(&mut self, user_text: &str) -> Result<AgentResponse, LlmError> {
        let checkpoint = self.checkpoint();
        match self.run_turn(user_text).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let dropped = self.rollback(checkpoint);
                tracing::warn!("Turn failed, rolled back {} turn(s): {}", dropped, e);
                Err(e)
            }
        }
    }
}

/// Truncate text for display
fn truncate_preview(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
