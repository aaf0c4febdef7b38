//! Shared HTTP transport for the OpenAI-compatible REST API.
//!
//! Both the embedding and the completion adapters post JSON to the same base URL with the same
//! bearer credential, so the request plumbing and error decoding live here.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the OpenAI transport.
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid OpenAI base URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with a non-success status code.
    #[error("OpenAI returned {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Error message extracted from the response body.
        message: String,
    },
    /// Response body could not be decoded into the expected shape.
    #[error("Malformed OpenAI response: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Thin JSON-over-HTTP client bound to one base URL and API key.
pub struct OpenAiTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiTransport {
    /// Build a transport for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, OpenAiError> {
        let client = Client::builder()
            .user_agent("mednotes/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(OpenAiError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized OpenAI HTTP transport");
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// POST `body` to `path` and decode the JSON response.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, OpenAiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format_endpoint(&self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|error| error.error.message)
                .unwrap_or(text);
            let error = OpenAiError::UnexpectedStatus { status, message };
            tracing::error!(path, error = %error, "OpenAI request failed");
            return Err(error);
        }

        serde_json::from_str(&text).map_err(|error| OpenAiError::Decode(error.to_string()))
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
