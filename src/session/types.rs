//! Session states, snapshots, and the controller error taxonomy.

use crate::index::IndexBuildError;
use crate::ingest::IngestError;
use crate::qa::QaError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of one session.
///
/// Failures are not states of their own: a failed upload returns to `Empty`, a failed question
/// returns to `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No document indexed yet.
    Empty,
    /// Upload received; parsing and indexing in progress.
    Ingesting,
    /// Index built; questions accepted.
    Ready,
    /// A question is being answered.
    Answering,
}

impl SessionState {
    /// Whether an action is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Ingesting | Self::Answering)
    }
}

/// Description of the document a session's index was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    /// Filename supplied with the upload.
    pub filename: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub fingerprint: String,
    /// Pages in the PDF.
    pub page_count: usize,
    /// Segments stored in the index.
    pub segment_count: usize,
}

/// Externally visible view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: Uuid,
    /// Current state.
    pub state: SessionState,
    /// Indexed document, when the session holds a record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentSummary>,
    /// Creation time (RFC 3339).
    pub created_at: String,
}

/// Result of an upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    /// Document now backing the session.
    pub document: DocumentSummary,
    /// True when identical bytes were already indexed and the existing index was kept.
    pub reused: bool,
}

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown or evicted session.
    #[error("Session {0} not found")]
    NotFound(Uuid),
    /// Another action is still running for this session.
    #[error("Session is busy ({0:?}); wait for the current action to finish")]
    Busy(SessionState),
    /// Questions require an indexed document.
    #[error("Please upload a PDF file to begin.")]
    NotReady,
    /// Upload is not declared as a PDF.
    #[error("Only PDF uploads are supported (got {0})")]
    UnsupportedMediaType(String),
    /// Parsing failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Embedding or index construction failed.
    #[error(transparent)]
    IndexBuild(#[from] IndexBuildError),
    /// Question answering failed.
    #[error(transparent)]
    Qa(#[from] QaError),
    /// A model client could not be constructed at startup.
    #[error("Failed to initialize {component} client: {reason}")]
    Init {
        /// Which client failed.
        component: &'static str,
        /// Underlying failure.
        reason: String,
    },
    /// Background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl SessionError {
    /// Short machine-readable error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "session_not_found",
            Self::Busy(_) => "session_busy",
            Self::NotReady => "no_document",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Ingest(IngestError::UnreadablePdf(_) | IngestError::NoExtractableText) => {
                "unreadable_pdf"
            }
            Self::Ingest(_) | Self::TaskFailed(_) | Self::Init { .. } => "internal",
            Self::IndexBuild(IndexBuildError::Embedding(_)) => "embedding_service_error",
            Self::IndexBuild(IndexBuildError::Index(_)) => "internal",
            Self::Qa(QaError::EmptyQuestion) => "empty_question",
            Self::Qa(QaError::Embedding(_)) => "embedding_service_error",
            Self::Qa(QaError::Generation(_)) => "generation_service_error",
            Self::Qa(QaError::Retrieval(_)) => "internal",
        }
    }
}
