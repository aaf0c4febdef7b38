//! Chat-completion client for the three medical prompt templates.
//!
//! Every operation is a single non-streaming call returning the first choice's text. Failures
//! are reported to the caller as-is; nothing is retried.

mod prompts;

pub use prompts::build_extraction_prompt;

use crate::config::Config;
use crate::index::SearchResult;
use crate::openai::{OpenAiError, OpenAiTransport};
use async_trait::async_trait;
use prompts::{
    ANSWER_SYSTEM_PROMPT, EXTRACTION_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT, build_answer_prompt,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while requesting completions.
#[derive(Debug, Error)]
pub enum CompletionClientError {
    /// Provider call failed (transport, status, or undecodable body).
    #[error("Completion request failed: {0}")]
    Upstream(#[from] OpenAiError),
    /// Provider answered without a usable message.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat-completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Summarize a medical note.
    async fn summarize(&self, text: &str) -> Result<String, CompletionClientError>;

    /// Answer `question` using only the supplied context documents.
    async fn answer(
        &self,
        question: &str,
        context: &[SearchResult],
    ) -> Result<String, CompletionClientError>;

    /// Run the structured-extraction prompt and return the raw JSON text.
    async fn extract(&self, prompt: &str) -> Result<String, CompletionClientError>;
}

/// Sampling parameters for one templated call.
#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
    json_mode: bool,
}

const SUMMARY_SAMPLING: Sampling = Sampling {
    temperature: 0.3,
    max_tokens: 500,
    json_mode: false,
};

const ANSWER_SAMPLING: Sampling = Sampling {
    temperature: 0.3,
    max_tokens: 500,
    json_mode: false,
};

const EXTRACTION_SAMPLING: Sampling = Sampling {
    temperature: 0.0,
    max_tokens: 1500,
    json_mode: true,
};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Completion client backed by the OpenAI `/chat/completions` endpoint.
pub struct OpenAiCompletionClient {
    transport: OpenAiTransport,
    model: String,
}

impl OpenAiCompletionClient {
    /// Wrap an existing transport with the given chat model.
    pub fn new(transport: OpenAiTransport, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    /// Build a client from configuration.
    pub fn from_config(config: &Config) -> Result<Self, CompletionClientError> {
        let transport = OpenAiTransport::new(
            &config.openai_base_url,
            config.openai_api_key.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )?;
        tracing::info!(model = %config.completion_model, "Completion client initialized");
        Ok(Self::new(transport, config.completion_model.clone()))
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        sampling: Sampling,
    ) -> Result<String, CompletionClientError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            response_format: sampling.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        tracing::debug!(
            model = %self.model,
            prompt_len = user.len(),
            temperature = sampling.temperature,
            max_tokens = sampling.max_tokens,
            "Requesting chat completion"
        );

        let response: ChatCompletionResponse = self
            .transport
            .post_json("chat/completions", &request)
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                CompletionClientError::InvalidResponse("response contained no message".into())
            })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn summarize(&self, text: &str) -> Result<String, CompletionClientError> {
        self.complete(SUMMARY_SYSTEM_PROMPT, text, SUMMARY_SAMPLING)
            .await
    }

    async fn answer(
        &self,
        question: &str,
        context: &[SearchResult],
    ) -> Result<String, CompletionClientError> {
        let prompt = build_answer_prompt(question, context);
        self.complete(ANSWER_SYSTEM_PROMPT, &prompt, ANSWER_SAMPLING)
            .await
    }

    async fn extract(&self, prompt: &str) -> Result<String, CompletionClientError> {
        self.complete(EXTRACTION_SYSTEM_PROMPT, prompt, EXTRACTION_SAMPLING)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> OpenAiCompletionClient {
        let transport =
            OpenAiTransport::new(&server.url("/v1"), "sk-test".into(), Duration::from_secs(5))
                .expect("transport");
        OpenAiCompletionClient::new(transport, "gpt-test")
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
            ]
        })
    }

    #[tokio::test]
    async fn summarize_sends_summary_template() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body_partial(
                        json!({
                            "model": "gpt-test",
                            "temperature": 0.3,
                            "max_tokens": 500,
                            "messages": [
                                { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
                                { "role": "user", "content": "Patient note" }
                            ]
                        })
                        .to_string(),
                    );
                then.status(200)
                    .json_body(completion_body("  Short summary.  "));
            })
            .await;

        let summary = client(&server)
            .summarize("Patient note")
            .await
            .expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "Short summary.");
    }

    #[tokio::test]
    async fn extract_requests_json_mode() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body_partial(
                        json!({
                            "temperature": 0.0,
                            "response_format": { "type": "json_object" }
                        })
                        .to_string(),
                    );
                then.status(200)
                    .json_body(completion_body("{\"conditions\": []}"));
            })
            .await;

        let raw = client(&server).extract("prompt").await.expect("extraction");

        mock.assert_async().await;
        assert_eq!(raw, "{\"conditions\": []}");
    }

    #[tokio::test]
    async fn answer_includes_context_in_user_message() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("Document 1: Visit 1");
                then.status(200).json_body(completion_body("Metformin."));
            })
            .await;

        let context = vec![SearchResult {
            id: 1,
            title: "Visit 1".into(),
            content: "Started metformin.".into(),
            similarity_score: 0.9,
        }];
        let answer = client(&server)
            .answer("Which drug?", &context)
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Metformin.");
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .summarize("note")
            .await
            .expect_err("no choices");
        assert!(matches!(error, CompletionClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn error_status_is_upstream_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = client(&server)
            .summarize("note")
            .await
            .expect_err("server error");
        assert!(matches!(error, CompletionClientError::Upstream(_)));
    }
}
