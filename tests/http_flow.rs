mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use common::pdf_with_pages;
use httpmock::prelude::*;
use pdfqa::api::create_router;
use pdfqa::config::{Config, EmbeddingProvider};
use pdfqa::session::SessionController;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "flow-boundary";

fn app_for(server: &MockServer) -> Router {
    let mut config = Config::new("flow-key");
    config.gemini_base_url = server.base_url();
    config.embedding_provider = EmbeddingProvider::Hashing;
    config.retrieval_top_k = 2;
    let config = Arc::new(config);
    let controller = SessionController::from_config(config.clone()).expect("controller");
    create_router(Arc::new(controller), config.upload_limit_bytes)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn upload(id: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(format!("/sessions/{id}/document"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn question(id: &str, text: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/sessions/{id}/questions"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "question": text }).to_string()))
        .unwrap()
}

async fn new_session(app: &Router) -> String {
    let (status, body) = call(
        app,
        Request::builder()
            .method(Method::POST)
            .uri("/sessions")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn upload_and_ask_over_http() {
    let server = MockServer::start_async().await;
    let generate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.5-pro:generateContent")
                .header("x-goog-api-key", "flow-key")
                .body_contains("Photosynthesis converts light into chemical energy");
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "It converts light into chemical energy." }] }
                }]
            }));
        })
        .await;
    let app = app_for(&server);
    let id = new_session(&app).await;

    let pdf = pdf_with_pages(&[
        "Volcanoes form where tectonic plates meet.",
        "Photosynthesis converts light into chemical energy.",
        "Glaciers carve valleys over thousands of years.",
    ]);
    let (status, body) = call(&app, upload(&id, "science.pdf", &pdf)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["document"]["page_count"], 3);

    let (status, body) = call(&app, question(&id, "What does photosynthesis convert light into?")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["answer"], "It converts light into chemical energy.");
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);
    assert_eq!(body["sources"][0]["page"], 2);
    generate.assert_async().await;

    let (status, body) = call(
        &app,
        Request::builder()
            .uri(format!("/sessions/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ready");
    assert_eq!(body["document"]["filename"], "science.pdf");
}

#[tokio::test]
async fn generation_outage_is_reported_and_session_stays_ready() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.5-pro:generateContent");
            then.status(503).body("backend unavailable");
        })
        .await;
    let app = app_for(&server);
    let id = new_session(&app).await;
    let (status, _) = call(&app, upload(&id, "a.pdf", &pdf_with_pages(&["Some page"]))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, question(&id, "What is on the page?")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "generation_service_error");

    let (_, body) = call(
        &app,
        Request::builder()
            .uri(format!("/sessions/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["state"], "ready");
}

#[tokio::test]
async fn question_before_upload_is_a_conflict() {
    let server = MockServer::start_async().await;
    let app = app_for(&server);
    let id = new_session(&app).await;

    let (status, body) = call(&app, question(&id, "Anything?")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no_document");
    assert_eq!(body["message"], "Please upload a PDF file to begin.");
}
