//! OpenAI-compatible embeddings adapter.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use colloquy_core::embedding::EmbeddingModel;
use colloquy_core::error::ModelError;

/// Embedding model requested when the caller doesn't pick one.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// An embedding model reached over the OpenAI-compatible `/v1/embeddings`
/// endpoint.
pub struct OpenAiCompatEmbedding {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatEmbedding {
    /// Create an adapter for an arbitrary OpenAI-compatible endpoint.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            client,
        }
    }

    /// Create an OpenAI adapter (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("https://api.openai.com/v1", api_key)
    }

    /// Override the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the embedder selected by the application config.
    ///
    /// Embeddings always go to the OpenAI endpoint; OpenRouter does not
    /// serve `/v1/embeddings`, and the key env chain accepts an OpenAI
    /// key directly.
    pub fn from_config(config: &colloquy_config::AppConfig) -> Result<Self, ModelError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ModelError::NotConfigured(
                "No API key configured. Set COLLOQUY_API_KEY or add api_key to config.toml".into(),
            )
        })?;

        Ok(Self::openai(api_key).with_model(config.retrieval.embedding_model.as_str()))
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiCompatEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(model = %self.model, chars = text.len(), "Sending embedding request");

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
            return Err(ModelError::AuthenticationFailed("Invalid API key".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: EmbeddingApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        api_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No embedding in response".into(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
