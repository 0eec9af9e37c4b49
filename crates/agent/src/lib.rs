//! # Colloquy Agent
//!
//! The agent loop: drive a model through a bounded generate/invoke-tools
//! cycle to a final answer, optionally streaming incremental text to the
//! caller. Also home to the context assembler, the pure string helpers
//! that fold session memory and retrieved knowledge into system prompts.

pub mod context;
pub mod runtime;

pub use context::{assemble_context, build_rag_system_prompt, build_system_prompt};
pub use runtime::{AgentResult, AgentRuntime};
