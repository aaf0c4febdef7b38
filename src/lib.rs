#![deny(missing_docs)]

//! Core library for the medical notes service.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat-completion client and prompt templates.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// WHO ICD-11 coding lookup.
pub mod icd;
/// In-memory vector index.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Note workflows composing storage, search, completions, and coding.
pub mod notes;
/// Shared OpenAI-compatible HTTP transport.
pub mod openai;
/// SQLite document store.
pub mod store;
