//! GeminiProvider against a local mock of the generateContent API

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use toolcall_agent::agent::Session;
use toolcall_agent::llm::{
    CompletionBackend, GeminiProvider, LlmError, Segment, ToolDefinition, Turn,
};
use toolcall_agent::tools::{FnTool, PathPolicy, ToolExecutor, ToolRegistry};

#[derive(Clone, Default)]
struct MockState {
    /// Queued generateContent replies as (status, body)
    replies: Arc<Mutex<Vec<(StatusCode, Value)>>>,
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn generate(
    State(state): State<MockState>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .requests
        .lock()
        .unwrap()
        .push((model_action, key, body));

    let mut replies = state.replies.lock().unwrap();
    if replies.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "no reply"})));
    }
    let (status, body) = replies.remove(0);
    (status, Json(body))
}

async fn list_models(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "models": [{
                "name": "models/gemini-2.5-flash",
                "displayName": "Gemini 2.5 Flash",
                "supportedGenerationMethods": ["generateContent", "countTokens"]
            }],
            "nextPageToken": "page-2"
        })),
        Some(_) => Json(json!({
            "models": [{
                "name": "models/embedding-001",
                "supportedGenerationMethods": ["embedContent"]
            }]
        })),
    }
}

async fn start_mock(replies: Vec<(StatusCode, Value)>) -> (String, MockState) {
    let state = MockState::default();
    *state.replies.lock().unwrap() = replies;

    let app = Router::new()
        .route("/models", get(list_models))
        .route("/models/:model_action", post(generate))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn provider(base_url: &str) -> GeminiProvider {
    GeminiProvider::with_api_key("test-key")
        .with_model("gemini-2.5-flash")
        .with_base_url(base_url)
}

fn text_reply(text: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 10,
                "candidatesTokenCount": 3,
                "totalTokenCount": 13
            }
        }),
    )
}

#[tokio::test]
async fn test_dispatch_text_reply() {
    let (base_url, state) = start_mock(vec![text_reply("Berlin")]).await;
    let provider = provider(&base_url);

    let dispatched = provider
        .dispatch(&[Turn::user("Capital of Germany?")], &[], Some("Be terse."))
        .await
        .unwrap();

    assert_eq!(dispatched.turn.text().as_deref(), Some("Berlin"));
    assert_eq!(dispatched.usage.unwrap().total_tokens, 13);

    let requests = state.requests.lock().unwrap();
    let (path, key, body) = &requests[0];
    assert_eq!(path, "gemini-2.5-flash:generateContent");
    assert_eq!(key.as_deref(), Some("test-key"));
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Capital of Germany?");
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_full_tool_round_over_http() {
    let (base_url, state) = start_mock(vec![
        (
            StatusCode::OK,
            json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{
                            "functionCall": {"name": "list_dir", "args": {"directory_path": "."}},
                            "thoughtSignature": "sig-123"
                        }]
                    },
                    "finishReason": "STOP"
                }]
            }),
        ),
        text_reply("a.txt, b.txt"),
    ])
    .await;

    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(FnTool::new(
            "list_dir",
            "List a directory.",
            json!({
                "type": "object",
                "properties": {"directory_path": {"type": "string"}},
                "required": ["directory_path"]
            }),
            |_| Ok(json!(["a.txt", "b.txt"])),
        )))
        .unwrap();
    let executor = ToolExecutor::new(Arc::new(registry), PathPolicy::unrestricted());
    let backend: Arc<dyn CompletionBackend> = Arc::new(provider(&base_url));
    let mut session = Session::new(backend, Arc::new(executor));

    let response = session.run_turn("What files are here?").await.unwrap();
    assert_eq!(response.text(), "a.txt, b.txt");
    assert_eq!(session.history().len(), 4);

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);

    let first = &requests[0].2;
    let declarations = &first["tools"][0]["functionDeclarations"];
    assert_eq!(declarations[0]["name"], "list_dir");
    assert_eq!(declarations[0]["parameters"]["required"][0], "directory_path");

    let second = &requests[1].2;
    let contents = second["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "list_dir");
    assert_eq!(contents[1]["parts"][0]["thoughtSignature"], "sig-123");
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(
        contents[2]["parts"][0]["functionResponse"],
        json!({"name": "list_dir", "response": {"result": ["a.txt", "b.txt"]}})
    );
}

#[tokio::test]
async fn test_http_errors_are_typed() {
    let (base_url, _state) = start_mock(vec![
        (StatusCode::UNAUTHORIZED, json!({"error": {"message": "bad key"}})),
        (StatusCode::TOO_MANY_REQUESTS, json!({"error": {"message": "slow down"}})),
        (StatusCode::BAD_REQUEST, json!({"error": {"message": "bad schema"}})),
    ])
    .await;
    let provider = provider(&base_url);
    let history = [Turn::user("hi")];

    let err = provider.dispatch(&history, &[], None).await.unwrap_err();
    assert!(matches!(err, LlmError::Unauthorized(_)));
    assert!(!err.is_retryable());

    let err = provider.dispatch(&history, &[], None).await.unwrap_err();
    assert!(matches!(err, LlmError::RateLimited(_)));
    assert!(err.is_retryable());

    let err = provider.dispatch(&history, &[], None).await.unwrap_err();
    assert!(matches!(err, LlmError::BadRequest(_)));
}

#[tokio::test]
async fn test_blocked_prompt_is_empty_response() {
    let (base_url, _state) = start_mock(vec![(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    )])
    .await;

    let err = provider(&base_url)
        .dispatch(&[Turn::user("hi")], &[], None)
        .await
        .unwrap_err();
    match err {
        LlmError::EmptyResponse(reason) => assert!(reason.contains("SAFETY")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_tools_sent_in_registration_order() {
    let (base_url, state) = start_mock(vec![text_reply("ok")]).await;
    let tools: Vec<ToolDefinition> = ["read_file", "write_file", "list_dir"]
        .iter()
        .map(|name| ToolDefinition {
            name: name.to_string(),
            description: String::new(),
            parameters: json!({"type": "object", "properties": {}}),
        })
        .collect();

    let dispatched = provider(&base_url)
        .dispatch(&[Turn::user("hi")], &tools, None)
        .await
        .unwrap();
    assert!(matches!(dispatched.turn.segments[0], Segment::Text { .. }));

    let requests = state.requests.lock().unwrap();
    let names: Vec<_> = requests[0].2["tools"][0]["functionDeclarations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["read_file", "write_file", "list_dir"]);
}

#[tokio::test]
async fn test_list_models_follows_pagination() {
    let (base_url, _state) = start_mock(vec![]).await;

    let models = provider(&base_url).list_models().await.unwrap();

    let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["models/gemini-2.5-flash", "models/embedding-001"]);
    assert_eq!(models[0].display_name.as_deref(), Some("Gemini 2.5 Flash"));
    assert!(models[1].display_name.is_none());
}
