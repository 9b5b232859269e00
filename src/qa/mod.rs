//! Retrieval-augmented question answering over one document's index.

mod prompt;

use crate::embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingTask};
use crate::generation::{GenerationClient, GenerationClientError, GenerationRequest};
use crate::index::{IndexError, RetrievedSegment, VectorIndex};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum QaError {
    /// Question was empty; nothing was sent anywhere.
    #[error("Please enter a question.")]
    EmptyQuestion,
    /// Question embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Question vector did not fit the index.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
    /// Chat model call failed.
    #[error(transparent)]
    Generation(#[from] GenerationClientError),
}

/// One question/answer exchange together with the evidence given to the model.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Question as submitted.
    pub question: String,
    /// Generated answer text.
    pub answer: String,
    /// Exactly the segments placed in the prompt, in rank order.
    pub sources: Vec<RetrievedSegment>,
}

/// Retrieval + generation handle bound to one immutable index.
pub struct RetrievalQa {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    model: String,
    temperature: Option<f32>,
    top_k: usize,
}

impl RetrievalQa {
    /// Bind an index to the clients used for questions.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        model: String,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            model,
            temperature: None,
            top_k: top_k.max(1),
        }
    }

    /// Forward a sampling temperature to the chat model.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// The index this handle reads from.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Embed the question, retrieve the top-k segments, and ask the chat model.
    ///
    /// Every call issues fresh embedding and generation requests; answers are not cached.
    pub async fn ask(&self, question: &str) -> Result<Answer, QaError> {
        if question.trim().is_empty() {
            return Err(QaError::EmptyQuestion);
        }

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![question.to_string()], EmbeddingTask::RetrievalQuery)
            .await?;
        let query = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no vector returned for the question".into())
        })?;

        let sources = self.index.search(&query, self.top_k)?;
        tracing::debug!(
            retrieved = sources.len(),
            top_page = ?sources.first().map(|source| source.page),
            "Retrieved context"
        );

        let answer = self
            .generator
            .generate(GenerationRequest {
                model: self.model.clone(),
                prompt: prompt::build_prompt(question, &sources),
                temperature: self.temperature,
            })
            .await?;

        Ok(Answer {
            question: question.to_string(),
            answer,
            sources,
        })
    }
}
