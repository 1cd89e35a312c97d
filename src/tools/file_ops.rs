//! File operation tools: read, write, list
//!
//! All filesystem access goes through `tokio::fs` so a call stuck on a pipe
//! or a hung mount still yields to the executor's timeout.

use super::{PathRequest, Tool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Resolve a model-supplied path: `~` expands to the home directory and
/// relative paths are taken from `working_dir`
fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    let expanded = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => dirs::home_dir()
            .map(|home| home.join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    };

    if expanded.is_absolute() {
        expanded
    } else {
        working_dir.join(expanded)
    }
}

fn string_arg(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Tool for reading file contents
pub struct ReadFileTool {
    working_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and return its contents."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to read."
                }
            },
            "required": ["file_path"]
        })
    }

    fn requested_paths(&self, params: &Value) -> Vec<PathRequest> {
        string_arg(params, "file_path")
            .map(|p| vec![PathRequest::read(resolve_path(&self.working_dir, &p))])
            .unwrap_or_default()
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            file_path: String,
        }

        let params: Params = serde_json::from_value(params)?;
        let path = resolve_path(&self.working_dir, &params.file_path);

        // Lossy UTF-8 so binary-ish files still produce something readable
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Tool for writing file contents
pub struct WriteFileTool {
    working_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write the given contents to a file, replacing it if it exists."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to write."
                },
                "contents": {
                    "type": "string",
                    "description": "Contents to write to the file."
                }
            },
            "required": ["file_path", "contents"]
        })
    }

    fn requested_paths(&self, params: &Value) -> Vec<PathRequest> {
        string_arg(params, "file_path")
            .map(|p| vec![PathRequest::write(resolve_path(&self.working_dir, &p))])
            .unwrap_or_default()
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            file_path: String,
            contents: String,
        }

        let params: Params = serde_json::from_value(params)?;
        let path = resolve_path(&self.working_dir, &params.file_path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create directory {}", parent.display()))?;
        }

        tokio::fs::write(&path, &params.contents)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        tracing::debug!("Wrote {} bytes to {}", params.contents.len(), path.display());

        Ok(Value::Bool(true))
    }
}

/// Tool for listing directory entries
pub struct ListDirTool {
    working_dir: PathBuf,
}

impl ListDirTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List all files and folders in a directory. Use '.' for the current directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory_path": {
                    "type": "string",
                    "description": "Directory to list, e.g. '.' for the current directory \
                                    or '..' for its parent."
                }
            },
            "required": ["directory_path"]
        })
    }

    fn requested_paths(&self, params: &Value) -> Vec<PathRequest> {
        string_arg(params, "directory_path")
            .map(|p| vec![PathRequest::read(resolve_path(&self.working_dir, &p))])
            .unwrap_or_default()
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Params {
            directory_path: String,
        }

        let params: Params = serde_json::from_value(params)?;
        let path = resolve_path(&self.working_dir, &params.directory_path);

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("cannot list {}", path.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("cannot list {}", path.display()))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(json!(names))
    }
}
