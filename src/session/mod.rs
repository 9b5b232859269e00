//! Per-user sessions: state machine, records, and the API consumed by the HTTP layer.

mod controller;
pub mod types;

use crate::ingest::UploadedDocument;
use crate::metrics::MetricsSnapshot;
use crate::qa::Answer;
use async_trait::async_trait;
use uuid::Uuid;

pub use controller::{SessionController, SessionRecord};
pub use types::{DocumentSummary, SessionError, SessionSnapshot, SessionState, UploadOutcome};

/// Abstraction over the session controller used by the HTTP surface.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Open a new, empty session.
    async fn create_session(&self) -> SessionSnapshot;

    /// Report a session's state and document.
    async fn describe_session(&self, id: Uuid) -> Result<SessionSnapshot, SessionError>;

    /// Ingest and index an uploaded PDF for the session.
    async fn upload_document(
        &self,
        id: Uuid,
        upload: UploadedDocument,
    ) -> Result<UploadOutcome, SessionError>;

    /// Answer a question against the session's document.
    async fn ask(&self, id: Uuid, question: String) -> Result<Answer, SessionError>;

    /// End the session and drop its index.
    async fn close_session(&self, id: Uuid) -> Result<(), SessionError>;

    /// Service counters for diagnostics.
    async fn metrics_snapshot(&self) -> MetricsSnapshot;
}
