//! Model backend adapters.
//!
//! Everything here speaks the OpenAI wire dialect, which covers the
//! bulk of hosted and self-hosted backends: OpenAI, OpenRouter, Ollama,
//! vLLM, and anything else exposing `/v1/chat/completions` and
//! `/v1/embeddings`.

pub mod embedding;
pub mod openai;

pub use embedding::OpenAiCompatEmbedding;
pub use openai::OpenAiCompatModel;
