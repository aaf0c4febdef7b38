//! Shared types for the ICD terminology client.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned while talking to the ICD API.
#[derive(Debug, Error)]
pub enum IcdError {
    /// Configured URL failed to parse.
    #[error("Invalid ICD URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// ICD API or token endpoint answered with an unexpected status.
    #[error("Unexpected ICD response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body did not match the expected shape.
    #[error("Malformed ICD response: {0}")]
    Decode(String),
}

/// Resolved ICD-11 code for a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IcdCode {
    /// Trailing path segment of the entity URI.
    pub code: String,
    /// Human-readable entity title.
    pub description: String,
}

/// Outcome of a successful lookup round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeLookup {
    /// The search produced an entity and its detail record was fetched.
    Found(IcdCode),
    /// The search produced no entities.
    NotFound,
}

#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default = "default_expires_in")]
    pub(crate) expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(rename = "destinationEntities", default)]
    pub(crate) destination_entities: Option<Vec<DestinationEntity>>,
}

#[derive(Deserialize)]
pub(crate) struct DestinationEntity {
    pub(crate) id: String,
}

#[derive(Deserialize)]
pub(crate) struct EntityDetail {
    #[serde(default)]
    pub(crate) title: Option<LocalizedText>,
}

#[derive(Deserialize)]
pub(crate) struct LocalizedText {
    #[serde(rename = "@value")]
    pub(crate) value: Option<String>,
}
