//! Agent tools and their execution boundary
//!
//! - `ToolRegistry`: name → tool, insertion ordered, shared read-only across sessions
//! - `ToolExecutor`: resolves, checks capabilities, validates and invokes a tool,
//!   turning every failure into an in-band error payload
//! - `file_ops`: the reference filesystem tools (`read_file`, `list_dir`, `write_file`)

mod capability;
mod file_ops;
pub mod schema;

pub use capability::{Access, PathPolicy, PathRequest};
pub use file_ops::{ListDirTool, ReadFileTool, WriteFileTool};

use crate::llm::{ToolCallResult, ToolDefinition};
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Failures while resolving or running a tool
///
/// Everything except `DuplicateTool` is reported back to the model as data.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{tool} failed: {message}")]
    Execution { tool: String, message: String },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },
}

/// Trait for agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model calls the tool by
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters(&self) -> Value;

    /// Run the tool with already-validated arguments
    async fn execute(&self, params: Value) -> Result<Value>;

    /// Filesystem paths this call would touch, checked before `execute`
    fn requested_paths(&self, _params: &Value) -> Vec<PathRequest> {
        Vec::new()
    }

    /// Convert to LLM tool definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

type ToolFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Tool backed by a plain closure
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        (self.func)(params)
    }
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the reference filesystem tools rooted at `working_dir`
    pub fn with_file_tools(working_dir: PathBuf) -> Self {
        let mut registry = Self::new();
        let tools: [Arc<dyn Tool>; 3] = [
            Arc::new(ReadFileTool::new(working_dir.clone())),
            Arc::new(WriteFileTool::new(working_dir.clone())),
            Arc::new(ListDirTool::new(working_dir)),
        ];
        for tool in tools {
            // Names are distinct constants
            let _ = registry.register(tool);
        }
        tracing::debug!("Tool registry created with tools: {:?}", registry.names());
        registry
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].clone())
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Tool definitions for the model, in registration order
    pub fn describe_all(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Runs tool calls behind validation, a capability check, a timeout and panic recovery
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: PathPolicy,
    tool_timeout_secs: u64,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, policy: PathPolicy) -> Self {
        Self {
            registry,
            policy,
            tool_timeout_secs: 60,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Execute a named tool; never fails, errors come back as the result payload
    pub async fn execute(&self, name: &str, arguments: &Value) -> ToolCallResult {
        match self.try_execute(name, arguments).await {
            Ok(value) => {
                tracing::debug!(tool = %name, "Tool succeeded");
                ToolCallResult::ok(name, value)
            }
            Err(e) => {
                tracing::warn!(tool = %name, "Tool call rejected or failed: {}", e);
                ToolCallResult::error(name, e.to_string())
            }
        }
    }

    async fn try_execute(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let tool = self.registry.lookup(name)?;

        // Gemini omits `args` for calls without parameters
        let params = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        schema::validate_arguments(&tool.parameters(), &params).map_err(|reason| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })?;

        for request in tool.requested_paths(&params) {
            self.policy.check(&request)?;
        }

        tracing::info!(tool = %name, "Executing tool");

        // Timeout + panic recovery so one bad tool cannot take the turn down
        match timeout(
            Duration::from_secs(self.tool_timeout_secs),
            AssertUnwindSafe(tool.execute(params)).catch_unwind(),
        )
        .await
        {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(ToolError::Execution {
                tool: name.to_string(),
                message: format!("{:#}", e),
            }),
            Ok(Err(panic_info)) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!("Tool '{}' panicked: {}", name, panic_msg);
                Err(ToolError::Execution {
                    tool: name.to_string(),
                    message: format!("crashed: {}", panic_msg),
                })
            }
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                secs: self.tool_timeout_secs,
            }),
        }
    }
}
