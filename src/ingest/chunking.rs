//! Page splitting for pages that exceed the embedding input budget.
//!
//! Most pages become exactly one segment. A page is only split when its token count is above
//! `SEGMENT_MAX_TOKENS`; splitting uses `semchunk-rs` so boundaries fall on paragraphs and
//! sentences where possible. Tokens are counted with the `cl100k_base` encoding, which tracks
//! Gemini tokenization closely enough for budgeting. If the encoding cannot be loaded the
//! splitter falls back to a whitespace counter.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while splitting page text.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Splitter configured with an impossible token budget.
    #[error("segment token budget must be greater than zero")]
    InvalidBudget,
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer: {0}")]
    Tokenizer(#[source] TokenizerError),
}

/// Splits page text into segments that fit the token budget.
#[derive(Clone)]
pub struct PageSplitter {
    max_tokens: usize,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for PageSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSplitter")
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl PageSplitter {
    /// Build a splitter counting tokens with `cl100k_base`, or whitespace when unavailable.
    pub fn new(max_tokens: usize) -> Result<Self, ChunkingError> {
        let token_counter = match build_tiktoken_counter() {
            Ok(counter) => counter,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                whitespace_token_counter()
            }
        };
        Self::with_counter(max_tokens, token_counter)
    }

    fn with_counter(max_tokens: usize, token_counter: TokenCounter) -> Result<Self, ChunkingError> {
        if max_tokens == 0 {
            return Err(ChunkingError::InvalidBudget);
        }
        Ok(Self {
            max_tokens,
            token_counter,
        })
    }

    /// Split `text` into one or more segments; whitespace-only input yields none.
    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if self.token_counter.as_ref()(trimmed) <= self.max_tokens {
            return vec![trimmed.to_string()];
        }

        let counter = self.token_counter.clone();
        let chunker = Chunker::new(
            self.max_tokens,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        chunker
            .chunk(trimmed)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }
}

fn build_tiktoken_counter() -> Result<TokenCounter, ChunkingError> {
    let encoding = Arc::new(cl100k_base().map_err(ChunkingError::Tokenizer)?);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
