//! Google Gemini completion backend
//!
//! SECURITY: API keys are ONLY sent to the configured Gemini endpoint, in the
//! `x-goog-api-key` header so they never appear in logged URLs.

use super::{
    CompletionBackend, Dispatched, LlmError, ModelInfo, Role, Segment, TokenUsage, ToolCall,
    ToolDefinition, Turn,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

/// Official Google Gemini API endpoint
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
    base_url: String,
}

impl GeminiProvider {
    /// Create a provider using the key from `GEMINI_API_KEY` or `GOOGLE_API_KEY`
    pub fn new() -> Result<Self, LlmError> {
        Ok(Self::with_api_key(Self::api_key_from_env()?))
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 8192,
            temperature: None,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Read the API key, preferring `GEMINI_API_KEY`
    pub fn api_key_from_env() -> Result<String, LlmError> {
        API_KEY_VARS
            .iter()
            .find_map(|var| env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                LlmError::MissingCredentials(
                    "set GEMINI_API_KEY or GOOGLE_API_KEY, \
                     e.g. export GEMINI_API_KEY='your-api-key'"
                        .to_string(),
                )
            })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Point the provider at another endpoint (proxies, local test servers)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Bound every HTTP request; dispatches otherwise wait indefinitely
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Other(e.into()))?;
        Ok(self)
    }

    fn convert_history(&self, history: &[Turn]) -> Vec<GeminiContent> {
        history
            .iter()
            .map(|turn| GeminiContent {
                role: turn.role.as_str().to_string(),
                parts: turn.segments.iter().map(Self::convert_segment).collect(),
            })
            .collect()
    }

    fn convert_segment(segment: &Segment) -> GeminiPart {
        match segment {
            Segment::Text { text } => GeminiPart::Text {
                text: text.clone(),
                thought: None,
            },
            Segment::ToolCallRequest(call) => GeminiPart::FunctionCall {
                function_call: GeminiFunctionCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                },
                thought_signature: call.thought_signature.clone(),
            },
            Segment::ToolCallResult(result) => GeminiPart::FunctionResponse {
                function_response: GeminiFunctionResponse {
                    name: result.name.clone(),
                    response: result.response.to_value(),
                },
            },
        }
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<GeminiFunctionDeclaration> {
        tools
            .iter()
            .map(|t| GeminiFunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect()
    }

    fn build_request(
        &self,
        history: &[Turn],
        tools: &[ToolDefinition],
        system_instruction: Option<&str>,
    ) -> GeminiRequest {
        GeminiRequest {
            contents: self.convert_history(history),
            system_instruction: system_instruction.map(|text| GeminiSystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: text.to_string(),
                    thought: None,
                }],
            }),
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: Some(self.max_tokens),
                temperature: self.temperature,
            }),
            tools: if tools.is_empty() {
                None
            } else {
                Some(vec![GeminiTools {
                    function_declarations: self.convert_tools(tools),
                }])
            },
        }
    }

    async fn send_request(&self, request: &GeminiRequest) -> Result<GeminiResponse, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text));
        }

        response.json::<GeminiResponse>().await.map_err(|e| {
            LlmError::Other(anyhow::anyhow!("Failed to parse Gemini API response: {}", e))
        })
    }

    fn parse_response(response: GeminiResponse) -> Result<Dispatched, LlmError> {
        let usage = response.usage_metadata.map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked ({})", r))
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(LlmError::EmptyResponse(reason));
        };

        let mut segments = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                GeminiPart::Text { thought: Some(true), .. } => {}
                GeminiPart::Text { text, .. } => segments.push(Segment::Text { text }),
                GeminiPart::FunctionCall {
                    function_call,
                    thought_signature,
                } => {
                    let arguments = match function_call.args {
                        Value::Null => Value::Object(Default::default()),
                        args => args,
                    };
                    segments.push(Segment::ToolCallRequest(ToolCall {
                        name: function_call.name,
                        arguments,
                        thought_signature,
                    }));
                }
                GeminiPart::FunctionResponse { .. } => {
                    tracing::warn!("Ignoring functionResponse part in model output");
                }
                GeminiPart::Other(value) => {
                    tracing::debug!("Ignoring unsupported Gemini part: {}", value);
                }
            }
        }

        if segments.is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(LlmError::EmptyResponse(format!(
                "candidate had no content (finish reason {})",
                reason
            )));
        }

        let dispatched = Dispatched::new(Turn::model(segments));
        Ok(match usage {
            Some(usage) => dispatched.with_usage(usage),
            None => dispatched,
        })
    }

    /// List the models available to this API key, following pagination
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .query(&[("pageSize", "100")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(LlmError::from_network_error)?;
            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                return Err(LlmError::from_http_status(status, error_text));
            }

            let page: GeminiModelList = response.json().await.map_err(|e| {
                LlmError::Other(anyhow::anyhow!("Failed to parse Gemini model list: {}", e))
            })?;

            models.extend(page.models.into_iter().map(|m| ModelInfo {
                name: m.name,
                display_name: m.display_name,
                supported_generation_methods: m.supported_generation_methods,
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!("Listed {} Gemini models", models.len());
        Ok(models)
    }
}

#[async_trait]
impl CompletionBackend for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
        let request = self.build_request(history, tools, system_instruction);
        tracing::debug!(
            model = %self.model,
            contents = request.contents.len(),
            tools = tools.len(),
            "Sending generateContent request"
        );

        let response = self.send_request(&request).await?;
        Self::parse_response(response)
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
        #[serde(
            rename = "thoughtSignature",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        thought_signature: Option<String>,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought: Option<bool>,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct GeminiTools {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
