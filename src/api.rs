//! HTTP surface for the PDF question-answering service.
//!
//! - `GET /` – Single-page UI for uploading a PDF and asking questions.
//! - `POST /sessions` – Open an empty session.
//! - `GET /sessions/:id` – Session state and the indexed document, if any.
//! - `DELETE /sessions/:id` – Close the session and drop its index.
//! - `POST /sessions/:id/document` – Multipart upload (field `file`) of the PDF to index.
//! - `POST /sessions/:id/questions` – Ask a question; returns the answer and its sources.
//! - `GET /metrics` – Ingestion and question counters.
//! - `GET /commands` – Machine-readable command catalog.

use crate::ingest::UploadedDocument;
use crate::session::{SessionApi, SessionError};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const INDEX_PAGE: &str = include_str!("assets/index.html");

/// Multipart field carrying the PDF bytes.
const UPLOAD_FIELD: &str = "file";

/// Build the HTTP router over a session service.
///
/// `upload_limit` caps request bodies so large PDFs are accepted up to the configured size.
pub fn create_router<S>(service: Arc<S>, upload_limit: usize) -> Router
where
    S: SessionApi + 'static,
{
    Router::new()
        .route("/", get(index_page))
        .route("/sessions", post(create_session::<S>))
        .route(
            "/sessions/:id",
            get(describe_session::<S>).delete(close_session::<S>),
        )
        .route("/sessions/:id/document", post(upload_document::<S>))
        .route("/sessions/:id/questions", post(ask_question::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(service)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn create_session<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: SessionApi,
{
    (StatusCode::CREATED, Json(service.create_session().await))
}

async fn describe_session<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    S: SessionApi,
{
    Ok(Json(service.describe_session(id).await?))
}

async fn close_session<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError>
where
    S: SessionApi,
{
    service.close_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accept a multipart upload and index it for the session.
///
/// Only the `file` field is read; other fields are ignored.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError>
where
    S: SessionApi,
{
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some(UploadedDocument {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let upload = upload.ok_or_else(|| {
        AppError::BadRequest(format!("Multipart field `{UPLOAD_FIELD}` is required"))
    })?;

    tracing::info!(
        session = %id,
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "Upload received"
    );
    Ok(Json(service.upload_document(id, upload).await?))
}

/// Request body for `POST /sessions/:id/questions`.
#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    Json(request): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError>
where
    S: SessionApi,
{
    Ok(Json(service.ask(id, request.question).await?))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: SessionApi,
{
    Json(service.metrics_snapshot().await)
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "create_session",
                method: "POST",
                path: "/sessions",
                description: "Open an empty session. Returns { \"id\", \"state\", \"created_at\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "describe_session",
                method: "GET",
                path: "/sessions/:id",
                description: "Report the session state (empty | ingesting | ready | answering) and its document.",
                request_example: None,
            },
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/sessions/:id/document",
                description: "Multipart upload of a PDF in the `file` field. Parses, embeds, and indexes every page.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/sessions/:id/questions",
                description: "Answer a question from the indexed document. Response carries the answer and its ranked source excerpts.",
                request_example: Some(json!({ "question": "What is the main topic?" })),
            },
            CommandDescriptor {
                name: "close_session",
                method: "DELETE",
                path: "/sessions/:id",
                description: "Close the session and release its index.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and question counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Session(SessionError),
    Upload(MultipartError),
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upload(error) => error.status(),
            Self::Session(error) => match error.kind() {
                "session_not_found" => StatusCode::NOT_FOUND,
                "session_busy" | "no_document" => StatusCode::CONFLICT,
                "unsupported_media_type" => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unreadable_pdf" => StatusCode::UNPROCESSABLE_ENTITY,
                "empty_question" => StatusCode::BAD_REQUEST,
                "embedding_service_error" | "generation_service_error" => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Upload(_) => "bad_request",
            Self::Session(error) => error.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Session(error) => error.to_string(),
            Self::Upload(error) => error.body_text(),
            Self::BadRequest(message) => message.clone(),
        };
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %message, "Request failed");
        }
        (
            status,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(inner: SessionError) -> Self {
        Self::Session(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Upload(inner)
    }
}
