//! Retriever trait: ranked knowledge-base lookup.
//!
//! A retriever answers a query with the most relevant content chunks it
//! knows about. It is consumed by the context assembler when building a
//! grounded system prompt, never by the agent loop directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// How many chunks to retrieve when the caller does not say.
pub const DEFAULT_TOP_K: usize = 5;

/// One retrieved piece of knowledge-base content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The chunk text
    pub content: String,

    /// Where the chunk came from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Similarity score, higher is more relevant
    pub score: f32,
}

/// The retrieval capability.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `top_k` chunks ranked by relevance to `query`.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}
