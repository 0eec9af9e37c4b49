//! # Colloquy Core
//!
//! Domain types, traits, and error definitions for the Colloquy
//! conversational-agent runtime. Nothing framework-shaped lives here:
//! this crate defines the contracts the rest of the workspace implements
//! against.
//!
//! Every capability the runtime consumes is a trait in this crate: text
//! generation, tool execution, session memory, retrieval, embeddings.
//! Concrete backends live in their own crates, which keeps the dependency
//! graph pointing inward and makes deterministic fixtures trivial to
//! write in tests.

pub mod error;
pub mod message;
pub mod model;
pub mod tool;
pub mod memory;
pub mod retrieval;
pub mod embedding;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ChatMessage, Role, ToolCall};
pub use model::{Model, ModelChunk, ModelContext, ModelResult, ToolDefinition, UsageMetrics};
pub use tool::{Tool, ToolRegistry};
pub use memory::MemoryStore;
pub use retrieval::{DEFAULT_TOP_K, RetrievedChunk, Retriever};
pub use embedding::EmbeddingModel;
