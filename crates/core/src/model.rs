//! Model trait: the abstraction over text-generation backends.
//!
//! A model knows how to turn a normalized conversation context into a
//! reply, either as a complete result or as a stream of incremental
//! chunks. The agent loop calls `generate()` and `stream()` without
//! knowing which backend sits behind the trait.
//!
//! Implementations: OpenAI-compatible endpoints (OpenAI, OpenRouter,
//! Ollama), deterministic stubs in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ModelError;
use crate::message::{ChatMessage, ToolCall};

/// The normalized request to a model backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelContext {
    /// The conversation transcript, oldest first
    pub messages: Vec<ChatMessage>,

    /// System prompt, sent as the leading system message when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call this turn. Empty means none are offered
    /// and backends must not send a tools block at all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl ModelContext {
    /// A context holding just a transcript.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    /// The generated text
    pub output: String,

    /// Tool calls the model wants executed, in order. Empty means the
    /// generation terminates the loop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
}

/// A single chunk of a streaming generation.
///
/// Text chunks arrive in generation order and concatenate to the full
/// output. A usage-bearing chunk, when the backend produces one, is the
/// final item of the stream and carries empty text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChunk {
    /// Incremental text, possibly empty
    #[serde(default)]
    pub text: String,

    /// Usage, carried by the terminal chunk only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
}

/// Token and latency accounting for one backend call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,

    /// Wall-clock duration of the backend call in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
}

impl UsageMetrics {
    /// Field-wise additive merge. Counts and durations are summed, never
    /// averaged; an agent run accumulates one of these across iterations.
    pub fn add(&mut self, other: &UsageMetrics) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.duration_ms += other.duration_ms;
    }
}

/// The model capability every text-generation backend implements.
#[async_trait]
pub trait Model: Send + Sync {
    /// A short name for this backend (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Produce a complete result for the given context.
    async fn generate(&self, context: ModelContext) -> Result<ModelResult, ModelError>;

    /// Produce a lazy, finite stream of chunks for the given context.
    ///
    /// The default implementation calls `generate()` and replays the
    /// result as one text chunk followed, when usage is available, by a
    /// terminal usage chunk.
    async fn stream(
        &self,
        context: ModelContext,
    ) -> Result<mpsc::Receiver<Result<ModelChunk, ModelError>>, ModelError> {
        let result = self.generate(context).await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx
            .send(Ok(ModelChunk {
                text: result.output,
                usage: None,
            }))
            .await;
        if let Some(usage) = result.usage {
            let _ = tx
                .send(Ok(ModelChunk {
                    text: String::new(),
                    usage: Some(usage),
                }))
                .await;
        }
        Ok(rx)
    }
}
