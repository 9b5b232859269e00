//! Answer generation through the hosted Gemini chat models.
//!
//! The retrieval chain assembles a prompt and hands it to a [`GenerationClient`]; the Gemini
//! adapter below issues one `generateContent` call per request and returns the concatenated
//! text of the first candidate.

use crate::config::Config;
use crate::gemini::{GeminiError, GeminiTransport};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was unreachable, timed out, or rejected the request.
    #[error("Generation service unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider refused to answer (safety block, empty candidate list).
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl From<GeminiError> for GenerationClientError {
    fn from(error: GeminiError) -> Self {
        match error {
            GeminiError::Decode(message) => Self::InvalidResponse(message),
            other => Self::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Request payload passed to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Fully assembled prompt (instructions, context, question).
    pub prompt: String,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
}

/// Interface implemented by answer generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a natural-language completion for the prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Build the generation client for the configuration.
pub fn get_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    let transport = GeminiTransport::new(config, "generation")?;
    Ok(Arc::new(GeminiGenerationClient::new(transport)))
}

/// Generation client backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerationClient {
    transport: GeminiTransport,
}

impl GeminiGenerationClient {
    /// Wrap a configured transport.
    pub fn new(transport: GeminiTransport) -> Self {
        Self { transport }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[async_trait]
impl GenerationClient for GeminiGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }]
        });
        if let Some(temperature) = request.temperature {
            payload["generationConfig"] = json!({ "temperature": temperature });
        }

        tracing::debug!(model = %request.model, "Requesting answer");
        let response: GenerateContentResponse = self
            .transport
            .post_json(&request.model, "generateContent", &payload)
            .await?;

        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(GenerationClientError::GenerationFailed(format!(
                "prompt blocked: {reason}"
            )));
        }

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            GenerationClientError::GenerationFailed("no candidates returned".into())
        })?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationClientError::GenerationFailed(format!(
                "empty completion (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text.trim().to_string())
    }
}
