use crate::config::{Config, EmbeddingProvider};
use crate::gemini::{GeminiError, GeminiTransport, model_path};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// `batchEmbedContents` accepts at most this many requests per call.
const GEMINI_MAX_BATCH: usize = 100;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached or rejected the call (network, quota, credentials).
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response did not contain one vector per input.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

impl From<GeminiError> for EmbeddingClientError {
    fn from(error: GeminiError) -> Self {
        match error {
            GeminiError::Decode(message) => Self::InvalidResponse(message),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Intended use of the vectors; Gemini optimizes documents and queries differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// Text segments stored in the index.
    RetrievalDocument,
    /// Questions used to search the index.
    RetrievalQuery,
}

impl EmbeddingTask {
    fn as_gemini(self) -> &'static str {
        match self {
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build an embedding client suitable for the configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Gemini => {
            let transport = GeminiTransport::new(config, "embeddings")?;
            Ok(Arc::new(GeminiEmbeddingClient::new(
                transport,
                config.embedding_model.clone(),
                config.embedding_dimension,
            )))
        }
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbeddingClient::new(
            config.hashing_dimension(),
        ))),
    }
}

/// Embedding client backed by the Gemini `batchEmbedContents` endpoint.
pub struct GeminiEmbeddingClient {
    transport: GeminiTransport,
    model: String,
    dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbeddingClient {
    /// Construct a client for `model`, optionally truncating vectors to `dimension`.
    pub fn new(transport: GeminiTransport, model: String, dimension: Option<usize>) -> Self {
        Self {
            transport,
            model,
            dimension,
        }
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let model = model_path(&self.model);
        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                let mut request = json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task.as_gemini(),
                });
                if let Some(dimension) = self.dimension {
                    request["outputDimensionality"] = json!(dimension);
                }
                request
            })
            .collect();

        let response: BatchEmbedResponse = self
            .transport
            .post_json(&model, "batchEmbedContents", &json!({ "requests": requests }))
            .await
            .map_err(|error| {
                if error.is_rate_limited() {
                    tracing::warn!(model = %model, "Embedding quota exhausted");
                }
                EmbeddingClientError::from(error)
            })?;

        if response.embeddings.len() != texts.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.model,
            texts = texts.len(),
            task = ?task,
            "Generating embeddings"
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(GEMINI_MAX_BATCH) {
            vectors.extend(self.embed_batch(batch, task).await?);
        }
        Ok(vectors)
    }
}

/// Deterministic offline embedder based on feature hashing of lowercase word tokens.
///
/// Identical texts always map to identical unit vectors and texts sharing vocabulary land
/// close together, which is enough for local runs and tests without a network.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing embedder producing vectors of `dimension` slots.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let slot = (hash % self.dimension as u64) as usize;
            // High bit picks the sign so unrelated tokens cancel out instead of piling up.
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[slot] += sign;
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

fn fnv1a(token: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    token.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
