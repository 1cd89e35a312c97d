//! The reference file tools behind the executor's capability checks

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use toolcall_agent::agent::Session;
use toolcall_agent::llm::{
    CompletionBackend, ScriptedBackend, Segment, ToolCall, ToolResponse, Turn,
};
use toolcall_agent::tools::{PathPolicy, ToolExecutor, ToolRegistry};

fn confined_executor(root: &TempDir) -> ToolExecutor {
    let registry = ToolRegistry::with_file_tools(root.path().to_path_buf());
    let policy = PathPolicy::confined_to([root.path()]).unwrap();
    ToolExecutor::new(Arc::new(registry), policy)
}

#[tokio::test]
async fn test_write_file_missing_contents_writes_nothing() {
    let root = TempDir::new().unwrap();
    let executor = confined_executor(&root);
    let target = root.path().join("x");

    let result = executor
        .execute("write_file", &json!({"file_path": target.to_str().unwrap()}))
        .await;

    assert!(result.is_error());
    let message = result.response.error_message().unwrap();
    assert!(
        message.starts_with("invalid arguments for write_file: "),
        "{}",
        message
    );
    assert!(message.contains("\"contents\""), "{}", message);
    assert!(!target.exists());
}

#[tokio::test]
async fn test_write_read_list_inside_root() {
    let root = TempDir::new().unwrap();
    let executor = confined_executor(&root);

    let written = executor
        .execute(
            "write_file",
            &json!({"file_path": "notes/todo.txt", "contents": "ship it"}),
        )
        .await;
    assert_eq!(written.response, ToolResponse::Result(json!(true)));

    let read = executor
        .execute("read_file", &json!({"file_path": "notes/todo.txt"}))
        .await;
    assert_eq!(read.response, ToolResponse::Result(json!("ship it")));

    let listed = executor
        .execute("list_dir", &json!({"directory_path": "notes"}))
        .await;
    assert_eq!(listed.response, ToolResponse::Result(json!(["todo.txt"])));
}

#[tokio::test]
async fn test_escape_attempts_are_denied() {
    let root = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let executor = confined_executor(&root);

    let escape = format!("../{}", outside.path().file_name().unwrap().to_str().unwrap());
    let attempts = [
        ("list_dir", json!({"directory_path": ".."})),
        ("list_dir", json!({"directory_path": escape})),
        (
            "write_file",
            json!({"file_path": outside.path().join("pwned").to_str().unwrap(), "contents": "x"}),
        ),
        ("read_file", json!({"file_path": "/etc/hostname"})),
    ];

    for (tool, args) in attempts {
        let result = executor.execute(tool, &args).await;
        let message = result.response.error_message().unwrap_or_default();
        assert!(
            message.starts_with("permission denied"),
            "{} {} -> {:?}",
            tool,
            args,
            result.response
        );
    }
    assert!(!outside.path().join("pwned").exists());
}

#[tokio::test]
async fn test_read_only_policy_blocks_write_file() {
    let root = TempDir::new().unwrap();
    let registry = ToolRegistry::with_file_tools(root.path().to_path_buf());
    let policy = PathPolicy::confined_to([root.path()])
        .unwrap()
        .with_read_only(true);
    let executor = ToolExecutor::new(Arc::new(registry), policy);

    let result = executor
        .execute("write_file", &json!({"file_path": "a.txt", "contents": "x"}))
        .await;
    assert!(result
        .response
        .error_message()
        .unwrap()
        .contains("write access is disabled"));
    assert!(!root.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_missing_file_error_reaches_model() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.txt"), "").unwrap();
    std::fs::write(root.path().join("b.txt"), "").unwrap();

    let backend = Arc::new(
        ScriptedBackend::new()
            .then_reply(Turn::model(vec![
                Segment::ToolCallRequest(ToolCall::new(
                    "list_dir",
                    json!({"directory_path": "."}),
                )),
                Segment::ToolCallRequest(ToolCall::new(
                    "read_file",
                    json!({"file_path": "missing.txt"}),
                )),
            ]))
            .then_reply(Turn::model_text("a.txt and b.txt; missing.txt does not exist")),
    );
    let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
    let mut session = Session::new(dyn_backend, Arc::new(confined_executor(&root)));

    let response = session.run_turn("look around").await.unwrap();
    assert_eq!(backend.dispatch_count(), 2);
    assert_eq!(response.tool_calls.len(), 2);

    let results: Vec<_> = session.history()[2].tool_results_iter().collect();
    assert_eq!(results[0].response, ToolResponse::Result(json!(["a.txt", "b.txt"])));
    let error = results[1].response.error_message().unwrap();
    assert!(error.starts_with("read_file failed: cannot read"), "{}", error);
}

#[cfg(unix)]
#[tokio::test]
async fn test_read_blocked_on_fifo_times_out() {
    let root = TempDir::new().unwrap();
    let fifo = root.path().join("pipe");
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .unwrap();
    assert!(status.success());

    let executor = confined_executor(&root).with_timeout_secs(1);
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        executor.execute("read_file", &json!({"file_path": "pipe"})),
    )
    .await
    .expect("tool timeout should fire before the outer one");

    assert_eq!(
        result.response.error_message(),
        Some("read_file timed out after 1 seconds")
    );

    // The abandoned reader is still parked in open(); give it a writer so it
    // sees EOF and the runtime can shut down
    drop(std::fs::OpenOptions::new().write(true).open(&fifo).unwrap());
}
