//! Core data types and error definitions for the notes service.

use crate::{
    completion::CompletionClientError,
    embedding::EmbeddingClientError,
    icd::IcdError,
    index::{IndexError, SearchResult},
    store::StoreError,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors surfaced by notes operations that are reported as HTTP failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No document carries the requested identifier.
    #[error("Document {0} not found")]
    NotFound(i64),
    /// Document store failed.
    #[error("Document store failed: {0}")]
    Store(#[from] StoreError),
    /// Structured extraction could not be produced.
    #[error("Structured extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Errors produced while turning a note into structured data.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Completion provider failed.
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
    /// Model output was not valid structured JSON.
    #[error("Model returned invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while wiring the service at startup.
#[derive(Debug, Error)]
pub enum InitError {
    /// Document store could not be opened.
    #[error("Failed to open document store: {0}")]
    Store(#[from] StoreError),
    /// Embedding client could not be constructed.
    #[error("Failed to initialize embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Completion client could not be constructed.
    #[error("Failed to initialize completions: {0}")]
    Completion(#[from] CompletionClientError),
    /// ICD client could not be constructed.
    #[error("Failed to initialize ICD client: {0}")]
    Icd(#[from] IcdError),
    /// Startup index build failed.
    #[error("Failed to build vector index: {0}")]
    Index(#[from] IndexError),
}

/// Result of `summarize_note`; failures are carried in `error` instead of failing the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummarizationResponse {
    /// Generated summary, empty on failure.
    pub summary: String,
    /// Failure description, if any.
    pub error: Option<String>,
}

/// Result of `answer_question`; failures are carried in `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionResponse {
    /// Generated answer or the canned no-information reply.
    pub answer: String,
    /// Documents supplied to the model as context.
    pub relevant_documents: Vec<SearchResult>,
    /// Failure description, if any.
    pub error: Option<String>,
}

/// Structured fields extracted from a medical note.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructuredExtraction {
    /// Demographics (`name`, `age`, `gender`, `dob`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub patient_info: Map<String, Value>,
    /// Diagnosed conditions, optionally enriched with ICD codes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<Condition>,
    /// Medication records.
    #[serde(default, deserialize_with = "null_as_default")]
    pub medications: Vec<Value>,
    /// Procedure records.
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedures: Vec<Value>,
    /// Allergy names.
    #[serde(default, deserialize_with = "null_as_default")]
    pub allergies: Vec<Value>,
    /// Vital signs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub vitals: Map<String, Value>,
    /// Laboratory results.
    #[serde(default, deserialize_with = "null_as_default")]
    pub lab_results: Vec<Value>,
    /// Any other top-level keys the model returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One extracted condition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Condition name as written by the model.
    #[serde(default, deserialize_with = "null_as_default")]
    pub condition: String,
    /// ICD code resolved for the condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icd_code: Option<String>,
    /// ICD title resolved for the condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icd_description: Option<String>,
    /// Remaining fields (`status`, `onset_date`, ...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
