//! Session controller: owns every session, runs each action as a spawned task, and evicts
//! idle sessions.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    generation::{GenerationClient, get_generation_client},
    index::build_index,
    ingest::{DocumentIngestor, UploadedDocument},
    metrics::{MetricsSnapshot, ServiceMetrics},
    qa::{Answer, QaError, RetrievalQa},
    session::{
        SessionApi,
        types::{DocumentSummary, SessionError, SessionSnapshot, SessionState, UploadOutcome},
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Built index plus the handle that answers questions against it.
#[derive(Clone)]
pub struct SessionRecord {
    /// Document the index was built from.
    pub document: DocumentSummary,
    /// Retrieval + generation chain bound to the index.
    pub chain: Arc<RetrievalQa>,
}

struct Session {
    state: SessionState,
    record: Option<SessionRecord>,
    created_at: OffsetDateTime,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Empty,
            record: None,
            created_at: OffsetDateTime::now_utc(),
            last_active: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn snapshot(&self, id: Uuid) -> SessionSnapshot {
        SessionSnapshot {
            id,
            state: self.state,
            document: self.record.as_ref().map(|record| record.document.clone()),
            created_at: self
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string()),
        }
    }
}

/// Shared handles used by the ingestion and answer tasks.
struct Pipeline {
    config: Arc<Config>,
    ingestor: DocumentIngestor,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
}

impl Pipeline {
    /// Parse, embed, and index an upload into a fresh record.
    async fn build_record(
        &self,
        upload: &UploadedDocument,
        fingerprint: String,
    ) -> Result<SessionRecord, SessionError> {
        let ingested = self.ingestor.ingest(upload).await?;
        let page_count = ingested.page_count;
        let index = build_index(self.embedder.as_ref(), ingested.segments).await?;

        let document = DocumentSummary {
            filename: upload.filename.clone(),
            fingerprint,
            page_count,
            segment_count: index.len(),
        };
        let chain = RetrievalQa::new(
            Arc::new(index),
            self.embedder.clone(),
            self.generator.clone(),
            self.config.generation_model.clone(),
            self.config.retrieval_top_k,
        )
        .with_temperature(self.config.generation_temperature);

        Ok(SessionRecord {
            document,
            chain: Arc::new(chain),
        })
    }
}

struct Inner {
    pipeline: Pipeline,
    sessions: Mutex<HashMap<Uuid, Session>>,
    metrics: ServiceMetrics,
    ttl: Duration,
}

impl Inner {
    async fn finish_ingest(
        &self,
        id: Uuid,
        result: Result<SessionRecord, SessionError>,
    ) -> Result<UploadOutcome, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id);
        if session.is_none() {
            tracing::warn!(session = %id, "Session closed while its document was ingesting");
        }

        match result {
            Ok(record) => {
                self.metrics
                    .record_document(record.document.segment_count as u64);
                let document = record.document.clone();
                if let Some(session) = session {
                    session.state = SessionState::Ready;
                    session.record = Some(record);
                    session.touch();
                }
                tracing::info!(
                    session = %id,
                    filename = %document.filename,
                    segments = document.segment_count,
                    "Document processed successfully"
                );
                Ok(UploadOutcome {
                    document,
                    reused: false,
                })
            }
            Err(error) => {
                self.metrics.record_failure();
                if let Some(session) = session {
                    session.state = SessionState::Empty;
                    session.record = None;
                    session.touch();
                }
                tracing::warn!(session = %id, error = %error, "Document ingestion failed");
                Err(error)
            }
        }
    }

    async fn finish_answer(&self, id: Uuid, result: &Result<Answer, QaError>) {
        match result {
            Ok(answer) => {
                self.metrics.record_answer();
                tracing::info!(
                    session = %id,
                    sources = answer.sources.len(),
                    "Question answered"
                );
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::warn!(session = %id, error = %error, "Question failed");
            }
        }
        self.restore_state(id, SessionState::Ready).await;
    }

    async fn restore_state(&self, id: Uuid, state: SessionState) {
        if let Some(session) = self.sessions.lock().await.get_mut(&id) {
            session.state = state;
            if state == SessionState::Empty {
                session.record = None;
            }
            session.touch();
        }
    }

    async fn evict_expired(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let idle = now.saturating_duration_since(session.last_active);
            let keep = session.state.is_busy() || idle < self.ttl;
            if !keep {
                tracing::debug!(session = %id, idle_secs = idle.as_secs(), "Evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }
}

/// Owns the session map and drives the per-session state machine.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Build a controller with the clients selected by configuration.
    pub fn from_config(config: Arc<Config>) -> Result<Self, SessionError> {
        tracing::info!("Initializing embedding client");
        let embedder = get_embedding_client(&config).map_err(|error| SessionError::Init {
            component: "embedding",
            reason: error.to_string(),
        })?;
        tracing::info!("Initializing generation client");
        let generator = get_generation_client(&config).map_err(|error| SessionError::Init {
            component: "generation",
            reason: error.to_string(),
        })?;
        Self::new(config, embedder, generator)
    }

    /// Build a controller around explicit clients.
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
    ) -> Result<Self, SessionError> {
        let ingestor = DocumentIngestor::new(config.segment_max_tokens)?;
        let ttl = config.session_ttl;
        Ok(Self {
            inner: Arc::new(Inner {
                pipeline: Pipeline {
                    config,
                    ingestor,
                    embedder,
                    generator,
                },
                sessions: Mutex::new(HashMap::new()),
                metrics: ServiceMetrics::new(),
                ttl,
            }),
        })
    }

    /// Open a new session in the `Empty` state.
    pub async fn create_session(&self) -> SessionSnapshot {
        let id = Uuid::new_v4();
        let session = Session::new();
        let snapshot = session.snapshot(id);
        self.inner.sessions.lock().await.insert(id, session);
        tracing::info!(session = %id, "Session created");
        snapshot
    }

    /// Current view of a session.
    pub async fn describe_session(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let mut sessions = self.inner.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        Ok(session.snapshot(id))
    }

    /// Ingest an upload and make it the session's document.
    ///
    /// Allowed from `Empty` and `Ready`. Identical bytes re-uploaded while `Ready` keep the
    /// existing index. Any failure clears the session back to `Empty`.
    pub async fn upload_document(
        &self,
        id: Uuid,
        upload: UploadedDocument,
    ) -> Result<UploadOutcome, SessionError> {
        let fingerprint = upload.fingerprint();
        {
            let mut sessions = self.inner.sessions.lock().await;
            let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
            session.touch();

            if session.state.is_busy() {
                return Err(SessionError::Busy(session.state));
            }
            if !upload.looks_like_pdf() {
                let declared = upload
                    .content_type
                    .clone()
                    .unwrap_or_else(|| upload.filename.clone());
                return Err(SessionError::UnsupportedMediaType(declared));
            }
            if let Some(record) = session
                .record
                .as_ref()
                .filter(|record| record.document.fingerprint == fingerprint)
            {
                tracing::info!(session = %id, "Identical document re-uploaded; keeping index");
                return Ok(UploadOutcome {
                    document: record.document.clone(),
                    reused: true,
                });
            }
            session.state = SessionState::Ingesting;
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let result = inner.pipeline.build_record(&upload, fingerprint).await;
            inner.finish_ingest(id, result).await
        });
        self.join(id, task, SessionState::Empty).await
    }

    /// Answer a question against the session's document.
    pub async fn ask(&self, id: Uuid, question: String) -> Result<Answer, SessionError> {
        let chain = {
            let mut sessions = self.inner.sessions.lock().await;
            let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
            session.touch();

            match session.state {
                SessionState::Ready => {}
                SessionState::Empty => return Err(SessionError::NotReady),
                busy => return Err(SessionError::Busy(busy)),
            }
            if question.trim().is_empty() {
                return Err(QaError::EmptyQuestion.into());
            }
            let chain = session
                .record
                .as_ref()
                .map(|record| record.chain.clone())
                .ok_or(SessionError::NotReady)?;
            session.state = SessionState::Answering;
            chain
        };

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let result = chain.ask(&question).await;
            inner.finish_answer(id, &result).await;
            result.map_err(SessionError::from)
        });
        self.join(id, task, SessionState::Ready).await
    }

    /// End a session and release its index.
    pub async fn close_session(&self, id: Uuid) -> Result<(), SessionError> {
        let removed = self.inner.sessions.lock().await.remove(&id);
        match removed {
            Some(_) => {
                tracing::info!(session = %id, "Session closed");
                Ok(())
            }
            None => Err(SessionError::NotFound(id)),
        }
    }

    /// Drop sessions idle for longer than the TTL; busy sessions are kept.
    pub async fn evict_expired(&self, now: Instant) -> usize {
        let evicted = self.inner.evict_expired(now).await;
        if evicted > 0 {
            tracing::info!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    /// Periodically evict idle sessions until the controller is dropped.
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let evicted = inner.evict_expired(Instant::now()).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Evicted idle sessions");
                }
            }
        })
    }

    /// Counters plus the number of live sessions.
    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        let active = self.inner.sessions.lock().await.len();
        self.inner.metrics.snapshot(active)
    }

    async fn join<T>(
        &self,
        id: Uuid,
        task: JoinHandle<Result<T, SessionError>>,
        fallback: SessionState,
    ) -> Result<T, SessionError> {
        match task.await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(session = %id, error = %error, "Session task aborted");
                self.inner.metrics.record_failure();
                self.inner.restore_state(id, fallback).await;
                Err(SessionError::TaskFailed(error.to_string()))
            }
        }
    }
}

#[async_trait]
impl SessionApi for SessionController {
    async fn create_session(&self) -> SessionSnapshot {
        SessionController::create_session(self).await
    }

    async fn describe_session(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        SessionController::describe_session(self, id).await
    }

    async fn upload_document(
        &self,
        id: Uuid,
        upload: UploadedDocument,
    ) -> Result<UploadOutcome, SessionError> {
        SessionController::upload_document(self, id, upload).await
    }

    async fn ask(&self, id: Uuid, question: String) -> Result<Answer, SessionError> {
        SessionController::ask(self, id, question).await
    }

    async fn close_session(&self, id: Uuid) -> Result<(), SessionError> {
        SessionController::close_session(self, id).await
    }

    async fn metrics_snapshot(&self) -> MetricsSnapshot {
        SessionController::metrics_snapshot(self).await
    }
}
