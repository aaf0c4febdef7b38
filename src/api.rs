//! HTTP surface for the medical notes service.
//!
//! The router exposes document storage, summarization, semantic search, question answering,
//! and structured extraction:
//!
//! - `POST /documents/` – Store a note; returns it with its assigned id.
//! - `GET /documents/` – Page through notes (`skip`, `limit` query parameters).
//! - `GET /documents/:id` – Fetch one note, 404 when unknown.
//! - `POST /summarize_note/` – Summarize a note; failures are reported in the body.
//! - `POST /search/` – Nearest-neighbour search over indexed notes.
//! - `POST /answer_question/` – Answer a question from the most relevant notes.
//! - `POST /extract_structured` – Extract structured clinical data with ICD codes.
//! - `GET /health` – Liveness and index size.
//! - `GET /docs` – Machine-readable endpoint catalog (`GET /` redirects here).

use crate::notes::{
    NotesApi, QuestionResponse, ServiceError, StructuredExtraction, SummarizationResponse,
};
use crate::{index::SearchResult, store::Document};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const DEFAULT_LIST_LIMIT: u32 = 100;

/// Build the HTTP router over any [`NotesApi`] implementation.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: NotesApi + 'static,
{
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/docs") }))
        .route("/docs", get(get_docs))
        .route("/health", get(health::<S>))
        .route(
            "/documents/",
            get(list_documents::<S>).post(create_document::<S>),
        )
        .route("/documents/:id", get(get_document::<S>))
        .route("/summarize_note/", post(summarize_note::<S>))
        .route("/search/", post(search::<S>))
        .route("/answer_question/", post(answer_question::<S>))
        .route("/extract_structured", post(extract_structured::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Body shared by document creation, summarization, and extraction.
#[derive(Deserialize)]
struct NoteRequest {
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_list_limit")]
    limit: u32,
}

fn default_list_limit() -> u32 {
    DEFAULT_LIST_LIMIT
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    indexed_documents: usize,
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: NotesApi,
{
    Json(HealthResponse {
        status: "ok",
        indexed_documents: service.index_size().await,
    })
}

async fn create_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<NoteRequest>,
) -> Result<Json<Document>, AppError>
where
    S: NotesApi,
{
    let document = service
        .create_document(&request.title, &request.content)
        .await?;
    Ok(Json(document))
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Document>>, AppError>
where
    S: NotesApi,
{
    let documents = service.list_documents(params.skip, params.limit).await?;
    Ok(Json(documents))
}

async fn get_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<i64>,
) -> Result<Json<Document>, AppError>
where
    S: NotesApi,
{
    Ok(Json(service.get_document(id).await?))
}

async fn summarize_note<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<NoteRequest>,
) -> Json<SummarizationResponse>
where
    S: NotesApi,
{
    tracing::debug!(title = %request.title, "Summarize request");
    Json(service.summarize_note(&request.content).await)
}

async fn search<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SearchRequest>,
) -> Json<Vec<SearchResult>>
where
    S: NotesApi,
{
    let results = service.search(&request.query, request.k).await;
    tracing::info!(results = results.len(), "Search request completed");
    Json(results)
}

async fn answer_question<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QuestionRequest>,
) -> Json<QuestionResponse>
where
    S: NotesApi,
{
    Json(service.answer_question(&request.question, request.k).await)
}

async fn extract_structured<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<NoteRequest>,
) -> Result<Json<StructuredExtraction>, AppError>
where
    S: NotesApi,
{
    let extraction = service
        .extract_structured(&request.title, &request.content)
        .await?;
    Ok(Json(extraction))
}

/// Descriptor for a single endpoint in the discovery catalog.
#[derive(Serialize)]
struct EndpointDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct DocsResponse {
    endpoints: Vec<EndpointDescriptor>,
}

/// Enumerate supported endpoints for discovery by clients and tools.
async fn get_docs() -> Json<DocsResponse> {
    let note_example = json!({
        "title": "Visit 1",
        "content": "Patient has type 2 diabetes."
    });
    Json(DocsResponse {
        endpoints: vec![
            EndpointDescriptor {
                name: "create_document",
                method: "POST",
                path: "/documents/",
                description: "Store a medical note and add it to the search index. Returns { \"id\", \"title\", \"content\" }.",
                request_example: Some(note_example.clone()),
            },
            EndpointDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/documents/",
                description: "List stored notes in creation order. Query parameters: skip (default 0), limit (default 100).",
                request_example: None,
            },
            EndpointDescriptor {
                name: "get_document",
                method: "GET",
                path: "/documents/{id}",
                description: "Fetch a stored note by id; 404 when it does not exist.",
                request_example: None,
            },
            EndpointDescriptor {
                name: "summarize_note",
                method: "POST",
                path: "/summarize_note/",
                description: "Summarize a note. Returns { \"summary\", \"error\" }.",
                request_example: Some(note_example.clone()),
            },
            EndpointDescriptor {
                name: "search",
                method: "POST",
                path: "/search/",
                description: "Semantic search over indexed notes, most similar first, with similarity_score in (0, 1].",
                request_example: Some(json!({ "query": "diabetes", "k": 3 })),
            },
            EndpointDescriptor {
                name: "answer_question",
                method: "POST",
                path: "/answer_question/",
                description: "Answer a question using only the most relevant notes. Returns { \"answer\", \"relevant_documents\", \"error\" }.",
                request_example: Some(json!({ "question": "What condition does the patient have?", "k": 3 })),
            },
            EndpointDescriptor {
                name: "extract_structured",
                method: "POST",
                path: "/extract_structured",
                description: "Extract patient info, conditions, medications, procedures, allergies, vitals, and lab results; conditions carry ICD-11 codes when found.",
                request_example: Some(note_example),
            },
            EndpointDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe reporting the number of indexed documents.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.0 {
            ServiceError::NotFound(id) => {
                tracing::debug!(document_id = id, "Document not found");
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "detail": "Document not found" })),
                )
                    .into_response()
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}
