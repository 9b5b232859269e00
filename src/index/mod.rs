//! In-memory vector index over the segments of one document.
//!
//! The index is built in one shot from the embedded segments and is read-only afterwards;
//! sessions share it behind an `Arc`. Search is an exact cosine scan, which is plenty for a
//! single document.

use crate::embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingTask};
use crate::ingest::TextSegment;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while constructing or querying an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index construction requires at least one segment.
    #[error("cannot build an index without segments")]
    Empty,
    /// Segment and vector counts disagree.
    #[error("received {vectors} vectors for {segments} segments")]
    CountMismatch {
        /// Number of segments supplied.
        segments: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector's length differs from the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Errors raised by [`build_index`].
#[derive(Debug, Error)]
pub enum IndexBuildError {
    /// Embedding provider failed; no partial index is kept.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vectors could not be assembled into an index.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
}

/// One vector paired with the segment it was computed from.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Source segment, page metadata included.
    pub segment: TextSegment,
    /// Embedding of the segment text.
    pub vector: Vec<f32>,
}

/// A segment returned by a search, labelled with its retrieval rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSegment {
    /// 1-based retrieval rank.
    pub rank: usize,
    /// Page the segment came from.
    pub page: u32,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Segment text.
    pub text: String,
}

/// Immutable collection of index entries with a fixed vector dimension.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl VectorIndex {
    /// Pair segments with their vectors, checking counts and dimensions.
    pub fn from_embeddings(
        segments: Vec<TextSegment>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if segments.is_empty() {
            return Err(IndexError::Empty);
        }
        if segments.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                segments: segments.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors[0].len();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let entries = segments
            .into_iter()
            .zip(vectors)
            .map(|(segment, vector)| IndexEntry { segment, vector })
            .collect();
        Ok(Self { entries, dimension })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries (never true for a built index).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension shared by all entries.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Entries in document order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep document order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedSegment>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query, &entry.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (position, score))| {
                let segment = &self.entries[position].segment;
                RetrievedSegment {
                    rank: rank + 1,
                    page: segment.page,
                    score,
                    text: segment.text.clone(),
                }
            })
            .collect())
    }
}

/// Embed every segment and build the index in one shot.
pub async fn build_index(
    embedder: &dyn EmbeddingClient,
    segments: Vec<TextSegment>,
) -> Result<VectorIndex, IndexBuildError> {
    if segments.is_empty() {
        return Err(IndexError::Empty.into());
    }

    let texts = segments.iter().map(|segment| segment.text.clone()).collect();
    let vectors = embedder
        .generate_embeddings(texts, EmbeddingTask::RetrievalDocument)
        .await?;
    let index = VectorIndex::from_embeddings(segments, vectors)?;
    tracing::debug!(
        entries = index.len(),
        dimension = index.dimension(),
        "Vector index built"
    );
    Ok(index)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;

    fn segment(page: u32, text: &str) -> TextSegment {
        TextSegment {
            page,
            text: text.into(),
        }
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let index = VectorIndex::from_embeddings(
            vec![segment(1, "a"), segment(2, "b"), segment(3, "c")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap();

        let hits = index.search(&[0.0, 2.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].rank, hits[0].page), (1, 2));
        assert_eq!((hits[1].rank, hits[1].page), (2, 3));
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_document_order() {
        let index = VectorIndex::from_embeddings(
            vec![segment(1, "first"), segment(2, "second")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 4).unwrap();
        let pages: Vec<u32> = hits.iter().map(|hit| hit.page).collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[test]
    fn construction_validates_shapes() {
        assert!(matches!(
            VectorIndex::from_embeddings(Vec::new(), Vec::new()),
            Err(IndexError::Empty)
        ));
        assert!(matches!(
            VectorIndex::from_embeddings(vec![segment(1, "a")], Vec::new()),
            Err(IndexError::CountMismatch { .. })
        ));
        assert!(matches!(
            VectorIndex::from_embeddings(
                vec![segment(1, "a"), segment(2, "b")],
                vec![vec![1.0, 0.0], vec![1.0]]
            ),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn query_dimension_must_match() {
        let index =
            VectorIndex::from_embeddings(vec![segment(1, "a")], vec![vec![1.0, 0.0]]).unwrap();
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn identical_text_is_retrieved_first() {
        let embedder = HashingEmbeddingClient::new(128);
        let segments = vec![
            segment(1, "Volcanoes erupt molten rock called lava"),
            segment(2, "Honeybees communicate through a waggle dance"),
            segment(3, "Compilers translate source code into machine code"),
        ];
        let index = build_index(&embedder, segments).await.expect("index");

        let query = embedder
            .generate_embeddings(
                vec!["Honeybees communicate through a waggle dance".into()],
                EmbeddingTask::RetrievalQuery,
            )
            .await
            .unwrap();
        let hits = index.search(&query[0], 4).unwrap();
        assert_eq!(hits[0].page, 2);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits.len(), 3);
    }
}
