//! EmbeddingModel trait: text to vector.
//!
//! Embeddings are a model-adjacent capability kept separate from the
//! chat [`Model`](crate::model::Model) trait: a deployment may embed
//! with one backend and generate with another.

use async_trait::async_trait;

use crate::error::ModelError;

/// The embedding capability, consumed by vector retrieval.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed one text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}
