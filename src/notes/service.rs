//! Notes service coordinating the document store, vector index, completions, and ICD lookups.

use crate::{
    completion::{CompletionClient, OpenAiCompletionClient, build_extraction_prompt},
    config::Config,
    embedding::build_embedding_client,
    icd::{CodeLookup, CodingLookup, IcdClient},
    index::{SearchResult, VectorIndex},
    notes::types::{
        ExtractionError, InitError, QuestionResponse, ServiceError, StructuredExtraction,
        SummarizationResponse,
    },
    store::{Document, DocumentStore},
};
use async_trait::async_trait;

pub(crate) const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information to answer your question.";
pub(crate) const SUMMARY_FAILED: &str = "Failed to generate summary. Please try again later.";
pub(crate) const ANSWER_FAILED: &str = "Failed to generate answer. Please try again later.";

/// Tunables applied by the service on top of its collaborators.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    /// Result count used when a caller omits `k`.
    pub search_default_k: usize,
    /// Upper bound applied to any requested `k`.
    pub search_max_k: usize,
    /// Append newly created documents to the vector index.
    pub index_on_create: bool,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            search_default_k: config.search_default_k,
            search_max_k: config.search_max_k,
            index_on_create: config.index_on_create,
        }
    }
}

/// Composes storage, semantic search, and the hosted model APIs per endpoint.
///
/// Construct once at startup (see [`NotesService::from_config`]) and share through an `Arc`.
pub struct NotesService {
    store: DocumentStore,
    index: VectorIndex,
    completion: Box<dyn CompletionClient>,
    coding: Box<dyn CodingLookup>,
    settings: ServiceSettings,
}

/// Abstraction over the notes operations used by the HTTP surface.
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// Persist a new document.
    async fn create_document(&self, title: &str, content: &str) -> Result<Document, ServiceError>;

    /// Page through stored documents in creation order.
    async fn list_documents(&self, skip: u32, limit: u32) -> Result<Vec<Document>, ServiceError>;

    /// Fetch one document.
    async fn get_document(&self, id: i64) -> Result<Document, ServiceError>;

    /// Summarize a note; failures are reported inside the response.
    async fn summarize_note(&self, content: &str) -> SummarizationResponse;

    /// Semantic search over indexed documents; failures degrade to no results.
    async fn search(&self, query: &str, k: Option<usize>) -> Vec<SearchResult>;

    /// Answer a question grounded in the nearest documents; failures are reported inside the response.
    async fn answer_question(&self, question: &str, k: Option<usize>) -> QuestionResponse;

    /// Extract structured data from a note and attach ICD codes to its conditions.
    async fn extract_structured(
        &self,
        title: &str,
        content: &str,
    ) -> Result<StructuredExtraction, ServiceError>;

    /// Number of entries in the vector index.
    async fn index_size(&self) -> usize;
}

impl NotesService {
    /// Assemble a service from already constructed collaborators.
    pub fn new(
        store: DocumentStore,
        index: VectorIndex,
        completion: Box<dyn CompletionClient>,
        coding: Box<dyn CodingLookup>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            index,
            completion,
            coding,
            settings,
        }
    }

    /// Open the store, build every client, and index all existing documents.
    pub async fn from_config(config: &Config) -> Result<Self, InitError> {
        let store = DocumentStore::connect(&config.database_url).await?;

        tracing::info!("Initializing embedding client");
        let embedder = build_embedding_client(config)?;
        let index = VectorIndex::new(embedder, config.embedding_dimension);

        let completion = OpenAiCompletionClient::from_config(config)?;
        let coding = IcdClient::from_config(config)?;

        let service = Self::new(
            store,
            index,
            Box::new(completion),
            Box::new(coding),
            ServiceSettings::from(config),
        );
        service.reindex_from_store().await?;
        Ok(service)
    }

    /// Replace the index contents with embeddings of every stored document.
    pub async fn reindex_from_store(&self) -> Result<usize, InitError> {
        let documents = self.store.all().await?;
        Ok(self.index.rebuild_from(&documents).await?)
    }

    /// Release the store's connections.
    pub async fn shutdown(&self) {
        self.store.close().await;
        tracing::info!("Notes service stopped");
    }

    fn effective_k(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.settings.search_default_k)
            .min(self.settings.search_max_k)
    }

    async fn enrich_conditions(&self, extraction: &mut StructuredExtraction) {
        for condition in &mut extraction.conditions {
            let name = condition.condition.trim();
            if name.is_empty() {
                continue;
            }
            match self.coding.lookup(name).await {
                Ok(CodeLookup::Found(code)) => {
                    tracing::debug!(condition = name, code = %code.code, "Condition coded");
                    condition.icd_code = Some(code.code);
                    condition.icd_description = Some(code.description);
                }
                Ok(CodeLookup::NotFound) => {
                    tracing::debug!(condition = name, "No ICD code for condition");
                }
                Err(error) => {
                    tracing::warn!(condition = name, error = %error, "ICD lookup failed");
                }
            }
        }
    }
}

#[async_trait]
impl NotesApi for NotesService {
    async fn create_document(&self, title: &str, content: &str) -> Result<Document, ServiceError> {
        let document = self.store.create(title, content).await?;
        if self.settings.index_on_create
            && let Err(error) = self.index.add(&document).await
        {
            tracing::warn!(
                document_id = document.id,
                error = %error,
                "Document stored but not indexed"
            );
        }
        tracing::info!(document_id = document.id, "Document created");
        Ok(document)
    }

    async fn list_documents(&self, skip: u32, limit: u32) -> Result<Vec<Document>, ServiceError> {
        Ok(self.store.list(skip, limit).await?)
    }

    async fn get_document(&self, id: i64) -> Result<Document, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    async fn summarize_note(&self, content: &str) -> SummarizationResponse {
        match self.completion.summarize(content).await {
            Ok(summary) => SummarizationResponse {
                summary,
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Summarization failed");
                SummarizationResponse {
                    summary: String::new(),
                    error: Some(SUMMARY_FAILED.to_string()),
                }
            }
        }
    }

    async fn search(&self, query: &str, k: Option<usize>) -> Vec<SearchResult> {
        let k = self.effective_k(k);
        match self.index.search(query, k).await {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(error = %error, "Search failed; returning no results");
                Vec::new()
            }
        }
    }

    async fn answer_question(&self, question: &str, k: Option<usize>) -> QuestionResponse {
        let k = self.effective_k(k);
        let relevant = match self.index.search(question, k).await {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(error = %error, "Context search failed");
                return QuestionResponse {
                    answer: String::new(),
                    relevant_documents: Vec::new(),
                    error: Some(format!("An error occurred: {error}")),
                };
            }
        };

        if relevant.is_empty() {
            return QuestionResponse {
                answer: NO_CONTEXT_ANSWER.to_string(),
                relevant_documents: Vec::new(),
                error: None,
            };
        }

        match self.completion.answer(question, &relevant).await {
            Ok(answer) => QuestionResponse {
                answer,
                relevant_documents: relevant,
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Answer generation failed");
                QuestionResponse {
                    answer: String::new(),
                    relevant_documents: Vec::new(),
                    error: Some(ANSWER_FAILED.to_string()),
                }
            }
        }
    }

    async fn extract_structured(
        &self,
        title: &str,
        content: &str,
    ) -> Result<StructuredExtraction, ServiceError> {
        let prompt = build_extraction_prompt(title, content);
        let raw = self
            .completion
            .extract(&prompt)
            .await
            .map_err(ExtractionError::from)?;
        let mut extraction: StructuredExtraction =
            serde_json::from_str(strip_code_fence(&raw)).map_err(ExtractionError::from)?;

        self.enrich_conditions(&mut extraction).await;
        tracing::info!(
            conditions = extraction.conditions.len(),
            coded = extraction
                .conditions
                .iter()
                .filter(|condition| condition.icd_code.is_some())
                .count(),
            "Structured extraction completed"
        );
        Ok(extraction)
    }

    async fn index_size(&self) -> usize {
        self.index.len().await
    }
}

/// Remove a surrounding Markdown code fence (with any language tag) some models wrap JSON in.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.strip_suffix("```").unwrap_or(rest);
    let body = match body.split_once('\n') {
        Some((tag, remainder)) if !tag.contains(['{', '[']) => remainder,
        _ => body.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim()
}
