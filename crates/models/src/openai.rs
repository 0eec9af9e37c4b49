//! OpenAI-compatible chat completions adapter.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! other endpoint speaking the `/v1/chat/completions` dialect.
//!
//! Supports:
//! - Non-streaming and streaming (SSE) generation
//! - Tool use / function calling
//! - Usage reporting, including on streamed responses

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use colloquy_core::error::ModelError;
use colloquy_core::message::{ChatMessage, Role, ToolCall};
use colloquy_core::model::{
    Model, ModelChunk, ModelContext, ModelResult, ToolDefinition, UsageMetrics,
};

/// A chat model reached over the OpenAI-compatible HTTP API.
///
/// Most hosted and self-hosted backends expose this dialect, so one
/// adapter covers them all; the convenience constructors just pick the
/// base URL.
#[derive(Debug)]
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create an adapter for an arbitrary OpenAI-compatible endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Create an OpenAI adapter (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Create an OpenRouter adapter (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key, model)
    }

    /// Create an Ollama adapter (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
        )
    }

    /// Build the adapter selected by the application config.
    pub fn from_config(config: &colloquy_config::AppConfig) -> Result<Self, ModelError> {
        let api_key = || {
            config.api_key.clone().ok_or_else(|| {
                ModelError::NotConfigured(
                    "No API key configured. Set COLLOQUY_API_KEY or add api_key to config.toml"
                        .into(),
                )
            })
        };

        match config.default_backend.as_str() {
            "openai" => Ok(Self::openai(api_key()?, config.default_model.as_str())),
            "openrouter" => Ok(Self::openrouter(api_key()?, config.default_model.as_str())),
            "ollama" => Ok(Self::ollama(None, config.default_model.as_str())),
            other => Err(ModelError::NotConfigured(format!(
                "Unknown backend '{other}'. Use 'openai', 'openrouter', or 'ollama'"
            ))),
        }
    }

    /// Convert a context to API wire messages, prepending the merged
    /// system prompt when one is present.
    fn to_api_messages(system_prompt: Option<&str>, messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut api_messages = Vec::with_capacity(messages.len() + 1);

        if let Some(prompt) = system_prompt {
            api_messages.push(ApiMessage {
                role: "system".into(),
                content: Some(prompt.to_string()),
                tool_calls: None,
                tool_call_id: None,
                name: None,
            });
        }

        for m in messages {
            api_messages.push(ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::Tool => "tool".into(),
                },
                content: m.content.clone(),
                tool_calls: m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id.clone(),
                name: m.name.clone(),
            });
        }

        api_messages
    }

    /// Convert tool definitions to API wire format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, context: &ModelContext, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(context.system_prompt.as_deref(), &context.messages),
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(temperature) = context.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = context.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !context.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&context.tools));
        }

        body
    }
}

#[async_trait]
impl Model for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, context: ModelContext) -> Result<ModelResult, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&context, false);

        debug!(backend = %self.name, model = %self.model, "Sending completion request");
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(e.to_string())
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = api_response.usage.map(|u| UsageMetrics {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            duration_ms: started.elapsed().as_millis() as u64,
        });

        Ok(ModelResult {
            output: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
        })
    }

    async fn stream(
        &self,
        context: ModelContext,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<ModelChunk, ModelError>>, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&context, true);

        debug!(backend = %self.name, model = %self.model, "Sending streaming request");
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(e.to_string())
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend streaming error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let backend_name = self.name.clone();

        // Read the SSE byte stream and parse chunks off the request path.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ModelError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines; partial lines stay buffered.
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip blank lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    // "[DONE]" signals end of stream
                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(parsed) => {
                            if let Some(choice) = parsed.choices.first()
                                && let Some(content) = &choice.delta.content
                                && !content.is_empty()
                            {
                                let chunk = ModelChunk {
                                    text: content.clone(),
                                    usage: None,
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }

                            // Usage arrives in a trailing chunk when
                            // stream_options requested it.
                            if let Some(usage) = parsed.usage {
                                let chunk = ModelChunk {
                                    text: String::new(),
                                    usage: Some(UsageMetrics {
                                        prompt_tokens: usage.prompt_tokens,
                                        completion_tokens: usage.completion_tokens,
                                        total_tokens: usage.total_tokens,
                                        duration_ms: started.elapsed().as_millis() as u64,
                                    }),
                                };
                                let _ = tx.send(Ok(chunk)).await;
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(
                                backend = %backend_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

// --- API wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openrouter_constructor() {
        let model = OpenAiCompatModel::openrouter("sk-test", "gpt-4o-mini");
        assert_eq!(model.name(), "openrouter");
        assert!(model.base_url.contains("openrouter.ai"));
        assert_eq!(model.model, "gpt-4o-mini");
    }

    #[test]
    fn ollama_constructor() {
        let model = OpenAiCompatModel::ollama(None, "llama3.2");
        assert_eq!(model.name(), "ollama");
        assert!(model.base_url.contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let model = OpenAiCompatModel::new("test", "http://host/v1/", "key", "m");
        assert_eq!(model.base_url, "http://host/v1");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = colloquy_config::AppConfig::default();
        let err = OpenAiCompatModel::from_config(&config).unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }

    #[test]
    fn from_config_ollama_needs_no_key() {
        let config = colloquy_config::AppConfig {
            default_backend: "ollama".into(),
            default_model: "llama3.2".into(),
            ..colloquy_config::AppConfig::default()
        };
        let model = OpenAiCompatModel::from_config(&config).unwrap();
        assert_eq!(model.name(), "ollama");
        assert_eq!(model.model, "llama3.2");
    }

    #[test]
    fn from_config_unknown_backend_is_rejected() {
        let config = colloquy_config::AppConfig {
            default_backend: "bedrock".into(),
            api_key: Some("k".into()),
            ..colloquy_config::AppConfig::default()
        };
        assert!(OpenAiCompatModel::from_config(&config).is_err());
    }

    #[test]
    fn message_conversion() {
        let messages = vec![ChatMessage::system("You are helpful"), ChatMessage::user("Hello")];
        let api_messages = OpenAiCompatModel::to_api_messages(None, &messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[1].content.as_deref(), Some("Hello"));
    }

    #[test]
    fn system_prompt_is_prepended() {
        let messages = vec![ChatMessage::user("Hello")];
        let api_messages = OpenAiCompatModel::to_api_messages(Some("Be brief."), &messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[0].content.as_deref(), Some("Be brief."));
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_1".into(),
                name: "get_weather".into(),
                arguments: r#"{"location":"Paris"}"#.into(),
            }]),
            tool_call_id: None,
            name: None,
        };
        let api_msgs = OpenAiCompatModel::to_api_messages(None, &[msg]);
        assert_eq!(api_msgs.len(), 1);
        assert!(api_msgs[0].content.is_none());
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "get_weather");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_result() {
        let msg = ChatMessage::tool_result("call_1", "get_weather", "{\"temp\":21}");
        let api_msgs = OpenAiCompatModel::to_api_messages(None, &[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_msgs[0].name.as_deref(), Some("get_weather"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "get_weather".into(),
            description: "Look up the weather".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatModel::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "get_weather");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn request_body_includes_optionals_only_when_set() {
        let model = OpenAiCompatModel::new("test", "http://host/v1", "key", "m");

        let bare = model.request_body(&ModelContext::new(vec![ChatMessage::user("hi")]), false);
        assert_eq!(bare["stream"], serde_json::json!(false));
        assert!(bare.get("temperature").is_none());
        assert!(bare.get("max_tokens").is_none());
        assert!(bare.get("tools").is_none());
        assert!(bare.get("stream_options").is_none());

        let mut context = ModelContext::new(vec![ChatMessage::user("hi")]);
        context.temperature = Some(0.2);
        context.max_tokens = Some(256);
        let full = model.request_body(&context, true);
        assert_eq!(full["temperature"], serde_json::json!(0.2));
        assert_eq!(full["max_tokens"], serde_json::json!(256));
        assert_eq!(full["stream_options"]["include_usage"], serde_json::json!(true));
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_stream_usage() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn parse_empty_delta() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Hi!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi!"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_completion_with_tool_calls() {
        let data = r#"{
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
                }]
            }}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let message = &parsed.choices[0].message;
        assert!(message.content.is_none());
        let tc = &message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.id, "call_abc");
        assert_eq!(tc.function.name, "get_weather");
        assert_eq!(tc.function.arguments, r#"{"location":"Paris"}"#);
    }
}
