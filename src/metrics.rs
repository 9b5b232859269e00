use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and question activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_ingested: AtomicU64,
    segments_indexed: AtomicU64,
    questions_answered: AtomicU64,
    failed_actions: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of segments produced for it.
    pub fn record_document(&self, segment_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.segments_indexed
            .fetch_add(segment_count, Ordering::Relaxed);
    }

    /// Record a successfully answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload or question that ended in an error.
    pub fn record_failure(&self) {
        self.failed_actions.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self, active_sessions: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            segments_indexed: self.segments_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            failed_actions: self.failed_actions.load(Ordering::Relaxed),
            active_sessions,
        }
    }
}

/// Immutable view of the service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents indexed since startup.
    pub documents_ingested: u64,
    /// Segments indexed across all documents.
    pub segments_indexed: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Uploads and questions that failed.
    pub failed_actions: u64,
    /// Sessions currently held in memory.
    pub active_sessions: usize,
}
