#![deny(missing_docs)]

//! Core library for the PDF question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Secrets and environment-driven configuration.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Shared HTTP transport for the Gemini REST API.
pub mod gemini;
/// Chat-model client abstraction and adapters.
pub mod generation;
/// In-memory vector index over document segments.
pub mod index;
/// PDF parsing and page segmentation.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Retrieval-augmented question answering.
pub mod qa;
/// Per-user sessions and their lifecycle.
pub mod session;
