//! HTTP transport shared by the Gemini embedding and generation clients.

use crate::config::Config;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Errors returned while talking to the Gemini REST API.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// HTTP layer failed before a response arrived (connect error, timeout, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Gemini answered with a non-success status.
    #[error("Unexpected Gemini response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Body of the failing response.
        body: String,
    },
    /// Response body did not match the expected schema.
    #[error("Malformed Gemini response: {0}")]
    Decode(String),
}

impl GeminiError {
    /// Whether the failure was caused by quota or rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Authenticated JSON client for `models/*:<method>` endpoints.
#[derive(Clone)]
pub struct GeminiTransport {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiTransport {
    /// Build a transport from configuration; `agent` is appended to the user agent.
    pub fn new(config: &Config, agent: &str) -> Result<Self, GeminiError> {
        let mut builder = Client::builder().user_agent(format!("pdfqa/{agent}"));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        tracing::debug!(
            base_url = %config.gemini_base_url,
            timeout = ?config.request_timeout,
            agent,
            "Initialized Gemini HTTP client"
        );
        Ok(Self::with_client(
            http,
            config.gemini_base_url.clone(),
            config.gemini_api_key.clone(),
        ))
    }

    pub(crate) fn with_client(http: Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Endpoint URL for `method` on `model`; bare model names gain the `models/` prefix.
    pub fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{method}", self.base_url, model_path(model))
    }

    /// POST `body` to the model method and decode the JSON response.
    pub async fn post_json<T>(&self, model: &str, method: &str, body: &Value) -> Result<T, GeminiError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(model, method);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = GeminiError::UnexpectedStatus { status, body };
            tracing::warn!(url = %url, error = %error, "Gemini request failed");
            return Err(error);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| GeminiError::Decode(err.to_string()))
    }
}

/// Normalize a model identifier into its `models/<name>` resource path.
pub fn model_path(model: &str) -> String {
    let trimmed = model.trim().trim_start_matches('/');
    if trimmed.starts_with("models/") || trimmed.starts_with("tunedModels/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}
