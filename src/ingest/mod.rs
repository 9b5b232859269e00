//! Document ingestion: uploaded PDF bytes in, ordered text segments out.
//!
//! Bytes are staged in a scoped temporary file for the duration of parsing. The file is a
//! [`tempfile::NamedTempFile`] owned by the blocking worker, so it is removed when the worker
//! returns, fails, or unwinds.

pub mod chunking;
pub mod pdf;

use chunking::{ChunkingError, PageSplitter};
use pdf::{PdfReadError, extract_pages};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STAGED_PREFIX: &str = "pdfqa-upload-";

/// Raw upload as received from the presentation layer.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Original filename supplied by the client.
    pub filename: String,
    /// Declared MIME type, if any.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    /// Whether the upload declares itself as a PDF through its MIME type or extension.
    pub fn looks_like_pdf(&self) -> bool {
        let by_type = self
            .content_type
            .as_deref()
            .map(|value| value.trim().eq_ignore_ascii_case("application/pdf"))
            .unwrap_or(false);
        let by_extension = self.filename.to_lowercase().ends_with(".pdf");
        by_type || by_extension
    }

    /// Hex-encoded SHA-256 of the contents.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// A contiguous slice of extracted text tagged with its source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    /// 1-based page number the text came from.
    pub page: u32,
    /// Segment text.
    pub text: String,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    /// Number of pages in the PDF, including pages without text.
    pub page_count: usize,
    /// Segments in document order.
    pub segments: Vec<TextSegment>,
}

/// Errors raised while turning an upload into text segments.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Bytes are not a readable PDF (corrupt, not a PDF, encrypted).
    #[error("Unreadable PDF: {0}")]
    UnreadablePdf(String),
    /// PDF parsed but none of its pages contain extractable text.
    #[error("Unreadable PDF: no extractable text (the document may be scanned images)")]
    NoExtractableText,
    /// Temporary file could not be written.
    #[error("Failed to stage upload: {0}")]
    Storage(#[from] std::io::Error),
    /// Page splitting failed.
    #[error("Failed to split page text: {0}")]
    Chunking(#[from] ChunkingError),
    /// Parsing worker panicked or was cancelled.
    #[error("PDF parsing worker failed: {0}")]
    Worker(String),
}

impl From<PdfReadError> for IngestError {
    fn from(error: PdfReadError) -> Self {
        Self::UnreadablePdf(error.to_string())
    }
}

/// Parses uploaded PDFs into text segments.
#[derive(Debug, Clone)]
pub struct DocumentIngestor {
    splitter: PageSplitter,
    staging_dir: Option<PathBuf>,
}

impl DocumentIngestor {
    /// Build an ingestor splitting pages above `segment_max_tokens`.
    pub fn new(segment_max_tokens: usize) -> Result<Self, IngestError> {
        Ok(Self {
            splitter: PageSplitter::new(segment_max_tokens)?,
            staging_dir: None,
        })
    }

    /// Stage uploads under `dir` instead of the system temporary directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Stage, parse, and segment the upload.
    ///
    /// Parsing runs on the blocking pool; the temporary file lives exactly as long as that job.
    pub async fn ingest(&self, upload: &UploadedDocument) -> Result<IngestedDocument, IngestError> {
        tracing::info!(
            filename = %upload.filename,
            bytes = upload.bytes.len(),
            "Ingesting document"
        );

        let bytes = upload.bytes.clone();
        let splitter = self.splitter.clone();
        let staging_dir = self.staging_dir.clone();
        let document = tokio::task::spawn_blocking(move || {
            parse_staged(&bytes, &splitter, staging_dir.as_deref())
        })
            .await
            .map_err(|err| IngestError::Worker(err.to_string()))??;

        tracing::info!(
            filename = %upload.filename,
            pages = document.page_count,
            segments = document.segments.len(),
            "Document ingested"
        );
        Ok(document)
    }
}

fn parse_staged(
    bytes: &[u8],
    splitter: &PageSplitter,
    staging_dir: Option<&Path>,
) -> Result<IngestedDocument, IngestError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(STAGED_PREFIX).suffix(".pdf");
    let mut staged = match staging_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    staged.write_all(bytes)?;
    staged.flush()?;
    tracing::debug!(path = %staged.path().display(), "Staged upload");

    let pages = extract_pages(staged.path())?;
    let page_count = pages.len();
    let segments: Vec<TextSegment> = pages
        .into_iter()
        .flat_map(|page| {
            splitter
                .split(&page.text)
                .into_iter()
                .map(move |text| TextSegment {
                    page: page.page,
                    text,
                })
        })
        .collect();

    if segments.is_empty() {
        return Err(IngestError::NoExtractableText);
    }

    Ok(IngestedDocument {
        page_count,
        segments,
    })
}
