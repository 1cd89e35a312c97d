//! Debug wrapper for completion backends
//!
//! Intercepts every dispatch and appends one JSON line for the request and
//! one for the response to a log file, correlated by a request id.

use super::{CompletionBackend, Dispatched, LlmError, ToolDefinition, Turn};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Backend decorator that logs all dispatches as JSONL
pub struct DebugBackend {
    inner: Arc<dyn CompletionBackend>,
    log_file: Arc<Mutex<std::fs::File>>,
}

impl DebugBackend {
    pub fn new(inner: Arc<dyn CompletionBackend>, log_path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            inner,
            log_file: Arc::new(Mutex::new(file)),
        })
    }

    async fn log(&self, entry: &DebugLogEntry<'_>) {
        let mut file = self.log_file.lock().await;
        let json = serde_json::to_string(entry).unwrap_or_default();
        if let Err(e) = writeln!(file, "{}", json) {
            tracing::warn!("Failed to write debug log entry: {}", e);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DebugLogEntry<'a> {
    Request {
        request_id: &'a str,
        timestamp: String,
        backend: &'a str,
        model: &'a str,
        system_instruction: Option<&'a str>,
        tools: Vec<&'a str>,
        history: &'a [Turn],
    },
    Response {
        request_id: &'a str,
        timestamp: String,
        duration_ms: u128,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn: Option<&'a Turn>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl CompletionBackend for DebugBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn dispatch(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
        system_instruction: Option<&str>,
    ) -> Result<Dispatched, LlmError> {
        let request_id = uuid::Uuid::new_v4().to_string();

        self.log(&DebugLogEntry::Request {
            request_id: &request_id,
            timestamp: timestamp(),
            backend: self.inner.name(),
            model: self.inner.model(),
            system_instruction,
            tools: tools.iter().map(|t| t.name.as_str()).collect(),
            history,
        })
        .await;

        let start = std::time::Instant::now();
        let result = self
            .inner
            .dispatch(history, tools, system_instruction)
            .await;
        let duration_ms = start.elapsed().as_millis();

        let (turn, error) = match &result {
            Ok(dispatched) => (Some(&dispatched.turn), None),
            Err(e) => (None, Some(e.to_string())),
        };
        self.log(&DebugLogEntry::Response {
            request_id: &request_id,
            timestamp: timestamp(),
            duration_ms,
            turn,
            error,
        })
        .await;

        result
    }
}
