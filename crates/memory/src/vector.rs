//! pgvector document store and retriever.
//!
//! Chunks live in the `document_chunks` table with a 1536-dimension
//! embedding column. Similarity is cosine distance via pgvector's
//! `<=>` operator, reported to callers as `1 - distance` so that
//! higher means closer.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use colloquy_core::embedding::EmbeddingModel;
use colloquy_core::error::RetrievalError;
use colloquy_core::retrieval::{RetrievedChunk, Retriever};

/// Render an embedding as a pgvector literal, e.g. `[0.1,0.2,0.3]`.
fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Document chunk storage over pgvector.
#[derive(Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    /// Open a fresh connection pool.
    pub async fn connect(database_url: &str) -> Result<Self, RetrievalError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RetrievalError::Backend(format!("PostgreSQL connection failed: {e}")))?;

        info!("Connected to PostgreSQL for vector store");
        Ok(Self::from_pool(pool))
    }

    /// Reuse an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store one chunk with its embedding.
    pub async fn insert(
        &self,
        content: &str,
        embedding: &[f32],
        source: Option<&str>,
    ) -> Result<(), RetrievalError> {
        sqlx::query(
            "INSERT INTO document_chunks (content, embedding, source) VALUES ($1, $2::vector, $3)",
        )
        .bind(content)
        .bind(vector_literal(embedding))
        .bind(source)
        .execute(&self.pool)
        .await
        .map_err(|e| RetrievalError::Backend(format!("Failed to insert chunk: {e}")))?;

        debug!(chars = content.len(), "Inserted document chunk");
        Ok(())
    }

    /// Return the `top_k` chunks nearest to the query embedding, best
    /// first.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let literal = vector_literal(query_embedding);

        let rows = sqlx::query(
            "SELECT content, source, 1 - (embedding <=> $1::vector) AS score \
             FROM document_chunks \
             ORDER BY embedding <=> $1::vector \
             LIMIT $2",
        )
        .bind(&literal)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RetrievalError::Backend(format!("Vector search failed: {e}")))?;

        rows.iter()
            .map(|row| {
                let content: String = row
                    .try_get("content")
                    .map_err(|e| RetrievalError::Backend(format!("Failed to read row: {e}")))?;
                let source: Option<String> = row
                    .try_get("source")
                    .map_err(|e| RetrievalError::Backend(format!("Failed to read row: {e}")))?;
                let score: f64 = row
                    .try_get("score")
                    .map_err(|e| RetrievalError::Backend(format!("Failed to read row: {e}")))?;

                Ok(RetrievedChunk {
                    content,
                    source,
                    score: score as f32,
                })
            })
            .collect()
    }
}

/// A retriever that embeds the query text and searches the chunk store.
pub struct PgVectorRetriever {
    store: PgVectorStore,
    embedder: Arc<dyn EmbeddingModel>,
}

impl PgVectorRetriever {
    pub fn new(store: PgVectorStore, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl Retriever for PgVectorRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Backend(format!("Query embedding failed: {e}")))?;

        self.store.search(&embedding, top_k).await
    }
}
