//! The agent runtime: a bounded generate/invoke-tools loop.
//!
//! One run: merge session memory into the system prompt, ask the model
//! to generate, execute any tool calls it requests, feed the results
//! back, and repeat until the model answers in plain text or the
//! iteration budget runs out. The terminating answer is optionally
//! re-requested as a stream so callers can surface text incrementally.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use colloquy_core::error::Error;
use colloquy_core::memory::MemoryStore;
use colloquy_core::message::{ChatMessage, Role, ToolCall};
use colloquy_core::model::{Model, ModelContext, UsageMetrics};
use colloquy_core::tool::ToolRegistry;

use crate::context::build_system_prompt;

/// Callback receiving each streamed output fragment.
pub type ChunkHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Callback receiving each iteration's usage and the 1-based iteration
/// number it belongs to.
pub type UsageHandler = Box<dyn Fn(&UsageMetrics, u32) + Send + Sync>;

/// The terminal output of one agent run.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// The final answer text
    pub output: String,

    /// Every message appended during the run, including tool round trips
    pub history: Vec<ChatMessage>,

    /// Accumulated usage; `None` if the backend never reported any
    pub usage: Option<UsageMetrics>,
}

/// The agent loop orchestrating model calls and tool execution.
///
/// Options are set in builder style; [`run`](AgentRuntime::run) drives
/// one request to completion. The runtime holds no per-run state, so
/// one instance can serve many sequential runs.
pub struct AgentRuntime {
    /// Tool registry shared with the rest of the process
    tools: Arc<ToolRegistry>,

    /// Upper bound on generate iterations per run
    max_iterations: u32,

    /// Optional per-session memory store
    memory: Option<Arc<dyn MemoryStore>>,

    /// Optional streaming output callback
    on_chunk: Option<ChunkHandler>,

    /// Optional per-iteration usage callback
    on_usage: Option<UsageHandler>,
}

impl AgentRuntime {
    /// Create a runtime with default options: five iterations, no
    /// memory, no callbacks.
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            max_iterations: 5,
            memory: None,
            on_chunk: None,
            on_usage: None,
        }
    }

    /// Set the maximum number of generate iterations per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Attach a session memory store. Its entries are folded into the
    /// system prompt at the start of the run, and the finished turn is
    /// written back at the end.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Deliver each streamed output fragment to `handler` as it
    /// arrives. Supplying a handler switches the terminating generation
    /// onto the streaming path.
    pub fn with_chunk_handler(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_chunk = Some(Box::new(handler));
        self
    }

    /// Receive each iteration's usage as the backend reports it.
    pub fn with_usage_handler(
        mut self,
        handler: impl Fn(&UsageMetrics, u32) + Send + Sync + 'static,
    ) -> Self {
        self.on_usage = Some(Box::new(handler));
        self
    }

    /// Drive one request through the loop to a final answer.
    ///
    /// Model and memory failures propagate unwrapped. Individual tool
    /// failures never abort the run; they become tool-role transcript
    /// messages the model sees on the next iteration. Exhausting the
    /// iteration budget fails the run with [`Error::MaxIterations`].
    pub async fn run(
        &self,
        model: &dyn Model,
        context: ModelContext,
    ) -> Result<AgentResult, Error> {
        // The triggering turn, kept for the memory write-back.
        let trigger = context.messages.last().cloned();

        // Merge session memory into the system prompt once per run; every
        // iteration reuses the merged prompt.
        let system_prompt = match &self.memory {
            Some(memory) => {
                let entries = memory.get_all().await?;
                let merged = build_system_prompt(&entries, context.system_prompt.as_deref());
                if merged.is_empty() { None } else { Some(merged) }
            }
            None => context.system_prompt.clone(),
        };

        info!(
            model = model.name(),
            messages = context.messages.len(),
            max_iterations = self.max_iterations,
            "Starting agent run"
        );

        let mut messages = context.messages.clone();
        let mut usage_total: Option<UsageMetrics> = None;
        let mut iteration: u32 = 0;

        while iteration < self.max_iterations {
            iteration += 1;
            debug!(iteration, transcript = messages.len(), "Agent loop iteration");

            let request = ModelContext {
                messages: messages.clone(),
                system_prompt: system_prompt.clone(),
                temperature: context.temperature,
                max_tokens: context.max_tokens,
                tools: context.tools.clone(),
            };

            let result = model.generate(request).await?;

            if let Some(usage) = &result.usage {
                accumulate(&mut usage_total, usage);
                if let Some(on_usage) = &self.on_usage {
                    on_usage(usage, iteration);
                }
            }

            if result.tool_calls.is_empty() {
                // Terminating generation.
                let output = match &self.on_chunk {
                    Some(on_chunk) => {
                        self.stream_final_answer(
                            model,
                            &messages,
                            &context,
                            system_prompt.clone(),
                            &mut usage_total,
                            iteration,
                            on_chunk,
                        )
                        .await?
                    }
                    None => result.output,
                };

                messages.push(ChatMessage::assistant(output.clone()));
                self.write_back(trigger.as_ref(), &output).await?;

                info!(iterations = iteration, "Agent run complete");
                return Ok(AgentResult {
                    output,
                    history: messages,
                    usage: usage_total,
                });
            }

            // The model wants tools. Record the assistant turn with its
            // calls, arguments carried through verbatim.
            debug!(tool_count = result.tool_calls.len(), "Executing tool calls");
            messages.push(ChatMessage {
                role: Role::Assistant,
                content: if result.output.is_empty() {
                    None
                } else {
                    Some(result.output.clone())
                },
                tool_calls: Some(result.tool_calls.clone()),
                tool_call_id: None,
                name: None,
            });

            for call in &result.tool_calls {
                let reply = self.invoke_tool(call).await;
                messages.push(ChatMessage::tool_result(&call.id, &call.name, reply));
            }
        }

        warn!(
            limit = self.max_iterations,
            "Agent run exhausted its iteration budget"
        );
        Err(Error::MaxIterations {
            limit: self.max_iterations,
        })
    }

    /// Re-request the terminating answer as a stream over the same
    /// transcript, delivering non-empty fragments to the chunk handler
    /// and returning the concatenated output.
    #[allow(clippy::too_many_arguments)]
    async fn stream_final_answer(
        &self,
        model: &dyn Model,
        messages: &[ChatMessage],
        context: &ModelContext,
        system_prompt: Option<String>,
        usage_total: &mut Option<UsageMetrics>,
        iteration: u32,
        on_chunk: &ChunkHandler,
    ) -> Result<String, Error> {
        let request = ModelContext {
            messages: messages.to_vec(),
            system_prompt,
            temperature: context.temperature,
            max_tokens: context.max_tokens,
            tools: context.tools.clone(),
        };

        let mut rx = model.stream(request).await?;
        let mut output = String::new();

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if !chunk.text.is_empty() {
                on_chunk(&chunk.text);
                output.push_str(&chunk.text);
            }
            // Usage rides on the terminal chunk and counts toward the
            // same iteration as the generate call it finalizes.
            if let Some(usage) = &chunk.usage {
                accumulate(usage_total, usage);
                if let Some(on_usage) = &self.on_usage {
                    on_usage(usage, iteration);
                }
            }
        }

        Ok(output)
    }

    /// Resolve and execute one tool call, converting every failure into
    /// the reply text recorded in the transcript.
    async fn invoke_tool(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Tool not found");
            return format!("Error: Tool {} not found.", call.name);
        };

        let arguments: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
                return format!("Error: {e}");
            }
        };

        let started = Instant::now();
        match tool.execute(arguments).await {
            Ok(value) => {
                debug!(
                    tool = %call.name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Tool finished"
                );
                serde_json::to_string(&value).unwrap_or_else(|e| format!("Error: {e}"))
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        }
    }

    /// Write the finished turn to session memory. Runs only on the
    /// terminating path; intermediate tool iterations never touch
    /// persistence.
    async fn write_back(&self, trigger: Option<&ChatMessage>, output: &str) -> Result<(), Error> {
        let Some(memory) = &self.memory else {
            return Ok(());
        };

        if let Some(trigger) = trigger
            && trigger.role == Role::User
            && let Some(content) = &trigger.content
            && !content.is_empty()
        {
            memory.add(&format!("User: {content}")).await?;
        }
        memory.add(&format!("Assistant: {output}")).await?;
        Ok(())
    }
}

fn accumulate(total: &mut Option<UsageMetrics>, usage: &UsageMetrics) {
    match total {
        Some(total) => total.add(usage),
        None => *total = Some(*usage),
    }
}
