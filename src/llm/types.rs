//! Shared conversation types passed between the agent and completion backends

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a turn
///
/// Tool results are folded back in as `User` turns to keep the wire shape uniform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    /// Opaque token some models attach to a call and expect echoed back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            thought_signature: None,
        }
    }
}

/// Outcome payload of a tool invocation
///
/// Serializes as `{"result": value}` or `{"error": "message"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolResponse {
    Result(Value),
    Error(String),
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolResponse::Error(message) => Some(message),
            ToolResponse::Result(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result of one tool call, correlated to its request by name and position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub name: String,
    pub response: ToolResponse,
}

impl ToolCallResult {
    pub fn ok(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            response: ToolResponse::Result(value),
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: ToolResponse::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.is_error()
    }
}

/// Smallest unit of content within a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    ToolCallRequest(ToolCall),
    ToolCallResult(ToolCallResult),
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One party's contribution to the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub segments: Vec<Segment>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            segments: vec![Segment::text(text)],
        }
    }

    pub fn model(segments: Vec<Segment>) -> Self {
        Self {
            role: Role::Model,
            segments,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Segment::text(text)])
    }

    /// Tool results folded back into the conversation as a user turn
    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self {
            role: Role::User,
            segments: results.into_iter().map(Segment::ToolCallResult).collect(),
        }
    }

    /// Concatenated text segments, or `None` when the turn carries no text
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self.segments.iter().filter_map(Segment::as_text).collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.segments.iter().filter_map(|s| match s {
            Segment::ToolCallRequest(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results_iter(&self) -> impl Iterator<Item = &ToolCallResult> {
        self.segments.iter().filter_map(|s| match s {
            Segment::ToolCallResult(result) => Some(result),
            _ => None,
        })
    }

    /// A mixture of text and calls counts as a tool-call turn
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }
}

/// Definition of a tool as presented to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// What a backend returns for one dispatch
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub turn: Turn,
    pub usage: Option<TokenUsage>,
}

impl Dispatched {
    pub fn new(turn: Turn) -> Self {
        Self { turn, usage: None }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A model advertised by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub supported_generation_methods: Vec<String>,
}
