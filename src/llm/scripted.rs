//! Scripted backend that replays canned turns
//!
//! Used by tests and offline demos: each dispatch pops the next scripted
//! reply and records what it was sent so callers can assert on the context.

use super::{CompletionBackend, Dispatched, LlmError, ToolDefinition, Turn};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What one dispatch received
#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    pub history: Vec<Turn>,
    pub tool_names: Vec<String>,
    pub system_instruction: Option<String>,
}

enum Reply {
    Turn(Turn),
    Fail(String),
}

pub struct ScriptedBackend {
    model: String,
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedDispatch>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a model turn to return on the next unanswered dispatch
    pub fn then_reply(self, turn: Turn) -> Self {
        self.push(Reply::Turn(turn));
        self
    }

    /// Queue a service failure
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Reply::Fail(message.into()));
        self
    }

    fn push(&self, reply: Reply) {
        lock(&self.replies).push_back(reply);
    }

    /// Number of dispatches received so far
    pub fn dispatch_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Snapshot of every dispatch received so far
    pub fn recorded(&self) -> Vec<RecordedDispatch> {
        lock(&self.calls).clone()
    }

    /// Replies not consumed yet
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

/// Script and recordings stay usable after a panicking test thread held a lock
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn dispatch(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
        system_instruction: Option<&str>,
    ) -> Result<Dispatched, LlmError> {
        lock(&self.calls).push(RecordedDispatch {
            history: history.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            system_instruction: system_instruction.map(str::to_string),
        });

        let reply = lock(&self.replies).pop_front();

        match reply {
            Some(Reply::Turn(turn)) => Ok(Dispatched::new(turn)),
            Some(Reply::Fail(message)) => Err(LlmError::ServiceError(message)),
            None => Err(LlmError::Other(anyhow::anyhow!(
                "scripted backend has no reply left"
            ))),
        }
    }
}
