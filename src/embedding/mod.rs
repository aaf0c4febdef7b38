use crate::config::{Config, EmbeddingProvider};
use crate::openai::{OpenAiError, OpenAiTransport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce an embedding for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Remote provider call failed.
    #[error("Embedding provider request failed: {0}")]
    Upstream(#[from] OpenAiError),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce the embedding vector for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError>;
}

/// Embedding client backed by the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    transport: OpenAiTransport,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Wrap an existing transport with the given embedding model.
    pub fn new(transport: OpenAiTransport, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            dimensions: None,
        }
    }

    /// Ask the provider to shorten vectors to `dimensions` components.
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }
}

/// Vector size a model returns when no `dimensions` parameter is sent.
fn native_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Only the `text-embedding-3` family accepts the `dimensions` parameter.
fn supports_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

/// Resolve the `dimensions` parameter for `model`, or reject a size the model cannot produce.
fn requested_dimensions(
    model: &str,
    dimension: usize,
) -> Result<Option<usize>, EmbeddingClientError> {
    match native_dimension(model) {
        Some(native) if native == dimension => Ok(None),
        Some(native) if !supports_dimensions(model) => {
            Err(EmbeddingClientError::GenerationFailed(format!(
                "model {model} produces {native}-dimensional vectors, but EMBEDDING_DIMENSION is {dimension}"
            )))
        }
        _ if supports_dimensions(model) => Ok(Some(dimension)),
        _ => Ok(None),
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, text_len = text.len(), "Requesting embedding");
        let response: EmbeddingResponse = self
            .transport
            .post_json(
                "embeddings",
                &EmbeddingRequest {
                    model: &self.model,
                    input: text,
                    dimensions: self.dimensions,
                },
            )
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| {
                EmbeddingClientError::GenerationFailed("provider returned no embeddings".into())
            })
    }
}

/// Deterministic offline embedder that hashes bytes into a normalized vector.
///
/// Identical input always maps to the identical vector, which makes it useful for local runs
/// without provider credentials and for exercising the index in tests.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing embedder producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self::encode(text, self.dimension))
    }
}

/// Build an embedding client suitable for the given configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::OpenAI => {
            let dimensions =
                requested_dimensions(&config.embedding_model, config.embedding_dimension)?;
            let transport = OpenAiTransport::new(
                &config.openai_base_url,
                config.openai_api_key.clone(),
                Duration::from_secs(config.http_timeout_secs),
            )?;
            tracing::info!(
                model = %config.embedding_model,
                dimensions = ?dimensions,
                "Using OpenAI embeddings"
            );
            Ok(Box::new(
                OpenAiEmbeddingClient::new(transport, config.embedding_model.clone())
                    .with_dimensions(dimensions),
            ))
        }
        EmbeddingProvider::Hashing => {
            tracing::info!(
                dimension = config.embedding_dimension,
                "Using deterministic hashing embeddings"
            );
            Ok(Box::new(HashingEmbeddingClient::new(
                config.embedding_dimension,
            )))
        }
    }
}
