//! In-memory nearest-neighbour index over document embeddings.
//!
//! The index is a flat list scanned linearly with squared Euclidean distance. Entries are copies
//! taken when a document is indexed. `add` appends; `rebuild_from` swaps in a freshly embedded
//! list. Embedding always happens outside the lock and only the append or swap takes the write
//! guard, so concurrent searches never observe a half-written entry.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::store::Document;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised while indexing or querying.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding provider failed for a document or query.
    #[error("Failed to embed text: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Returned embedding dimension does not match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension every entry in the index shares.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Snapshot of a document together with its embedding.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    /// Store identifier of the source document.
    pub id: i64,
    /// Title at indexing time.
    pub title: String,
    /// Content at indexing time.
    pub content: String,
    /// Embedding of the combined title and content.
    pub embedding: Vec<f32>,
}

/// Ranked hit returned by [`VectorIndex::search`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Store identifier of the matching document.
    pub id: i64,
    /// Document title.
    pub title: String,
    /// Document content.
    pub content: String,
    /// `1 / (1 + d)` where `d` is the squared Euclidean distance; in `(0, 1]`.
    pub similarity_score: f32,
}

/// Flat L2 index over document snapshots.
pub struct VectorIndex {
    embedder: Box<dyn EmbeddingClient>,
    dimension: usize,
    entries: RwLock<Vec<IndexedDocument>>,
}

impl VectorIndex {
    /// Create an empty index that embeds through `embedder` and expects `dimension`-length vectors.
    pub fn new(embedder: Box<dyn EmbeddingClient>, dimension: usize) -> Self {
        Self {
            embedder,
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Replace the index contents with embeddings of `documents`, one provider call per document.
    ///
    /// Embedding happens before the write lock is taken; on failure the current entries are left
    /// untouched.
    pub async fn rebuild_from(&self, documents: &[Document]) -> Result<usize, IndexError> {
        tracing::info!(documents = documents.len(), "Building vector index");
        let mut rebuilt = Vec::with_capacity(documents.len());
        for document in documents {
            rebuilt.push(self.embed_document(document).await?);
        }
        let size = rebuilt.len();
        *self.entries.write().await = rebuilt;
        tracing::info!(entries = size, "Vector index ready");
        Ok(size)
    }

    /// Embed a single document and append it to the index.
    pub async fn add(&self, document: &Document) -> Result<(), IndexError> {
        let entry = self.embed_document(document).await?;
        let mut entries = self.entries.write().await;
        entries.push(entry);
        tracing::debug!(document_id = document.id, entries = entries.len(), "Document indexed");
        Ok(())
    }

    /// Return up to `k` entries nearest to `query`, most similar first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, IndexError> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_checked(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, squared_l2(&entry.embedding, &query_vector)))
            .collect();
        // `sort_by` is stable, so equal distances keep insertion order.
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        let results = scored
            .into_iter()
            .map(|(position, distance)| {
                let entry = &entries[position];
                SearchResult {
                    id: entry.id,
                    title: entry.title.clone(),
                    content: entry.content.clone(),
                    similarity_score: similarity_from_distance(distance),
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(k, hits = results.len(), "Vector search completed");
        Ok(results)
    }

    /// Number of indexed entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the index holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn embed_document(&self, document: &Document) -> Result<IndexedDocument, IndexError> {
        let embedding = self.embed_checked(&document_text(document)).await?;
        Ok(IndexedDocument {
            id: document.id,
            title: document.title.clone(),
            content: document.content.clone(),
            embedding,
        })
    }

    async fn embed_checked(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Text embedded for a document.
pub fn document_text(document: &Document) -> String {
    format!("Title: {}\nContent: {}", document.title, document.content)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn doc(id: i64, title: &str, content: &str) -> Document {
        Document {
            id,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Maps known texts to fixed vectors and counts calls.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingClient for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.table
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingClientError::GenerationFailed(format!("unknown: {text}")))
        }
    }

    fn table_index(pairs: &[(&str, Vec<f32>)]) -> (VectorIndex, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let table = pairs
            .iter()
            .map(|(text, vector)| (text.to_string(), vector.clone()))
            .collect();
        let embedder = TableEmbedder {
            table,
            calls: calls.clone(),
        };
        (VectorIndex::new(Box::new(embedder), 2), calls)
    }

    #[tokio::test]
    async fn empty_index_returns_no_results_without_embedding() {
        let (index, calls) = table_index(&[]);
        let results = index.search("anything", 5).await.expect("search");
        assert!(results.is_empty());
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn results_are_ordered_by_distance_with_scores_in_range() {
        let (index, _) = table_index(&[
            ("Title: a\nContent: near", vec![1.0, 0.0]),
            ("Title: b\nContent: far", vec![4.0, 0.0]),
            ("Title: c\nContent: mid", vec![2.0, 0.0]),
            ("query", vec![1.0, 0.0]),
        ]);
        index
            .rebuild_from(&[doc(1, "a", "near"), doc(2, "b", "far"), doc(3, "c", "mid")])
            .await
            .expect("build");

        let results = index.search("query", 10).await.expect("search");
        let ids: Vec<i64> = results.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);

        assert!((results[0].similarity_score - 1.0).abs() < f32::EPSILON);
        assert!((results[1].similarity_score - 0.5).abs() < 1e-6);
        assert!((results[2].similarity_score - 0.1).abs() < 1e-6);
        for window in results.windows(2) {
            assert!(window[0].similarity_score >= window[1].similarity_score);
        }
        for hit in &results {
            assert!(hit.similarity_score > 0.0 && hit.similarity_score <= 1.0);
        }
    }

    #[tokio::test]
    async fn k_limits_result_count() {
        let (index, _) = table_index(&[
            ("Title: a\nContent: x", vec![0.0, 0.0]),
            ("Title: b\nContent: y", vec![1.0, 1.0]),
            ("q", vec![0.0, 0.0]),
        ]);
        index
            .rebuild_from(&[doc(1, "a", "x"), doc(2, "b", "y")])
            .await
            .expect("build");

        assert_eq!(index.search("q", 1).await.expect("search").len(), 1);
        assert!(index.search("q", 0).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let (index, _) = table_index(&[
            ("Title: first\nContent: same", vec![1.0, 1.0]),
            ("Title: second\nContent: same", vec![1.0, 1.0]),
            ("q", vec![0.0, 0.0]),
        ]);
        index.add(&doc(7, "first", "same")).await.expect("add");
        index.add(&doc(3, "second", "same")).await.expect("add");

        let ids: Vec<i64> = index
            .search("q", 2)
            .await
            .expect("search")
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(ids, vec![7, 3]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let (index, _) = table_index(&[("Title: t\nContent: c", vec![1.0, 2.0, 3.0])]);
        let error = index.add(&doc(1, "t", "c")).await.expect_err("mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn query_embedding_failure_propagates() {
        let (index, _) = table_index(&[("Title: t\nContent: c", vec![1.0, 2.0])]);
        index.add(&doc(1, "t", "c")).await.expect("add");
        let error = index.search("unknown query", 3).await.expect_err("failure");
        assert!(matches!(error, IndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn identical_text_scores_one() {
        let index = VectorIndex::new(Box::new(HashingEmbeddingClient::new(64)), 64);
        let document = doc(1, "Visit 1", "Patient has type 2 diabetes.");
        index.add(&document).await.expect("add");

        let results = index
            .search(&document_text(&document), 3)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity_score, 1.0);
    }

    #[tokio::test]
    async fn build_embeds_each_document_once() {
        let (index, calls) = table_index(&[
            ("Title: a\nContent: x", vec![0.0, 0.0]),
            ("Title: b\nContent: y", vec![1.0, 1.0]),
        ]);
        let size = index
            .rebuild_from(&[doc(1, "a", "x"), doc(2, "b", "y")])
            .await
            .expect("build");
        assert_eq!(size, 2);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rebuild_replaces_existing_entries() {
        let (index, _) = table_index(&[
            ("Title: a\nContent: x", vec![0.0, 0.0]),
            ("Title: b\nContent: y", vec![1.0, 1.0]),
            ("q", vec![0.0, 0.0]),
        ]);
        index.add(&doc(1, "a", "x")).await.expect("add");

        let size = index
            .rebuild_from(&[doc(1, "a", "x"), doc(2, "b", "y")])
            .await
            .expect("rebuild");
        assert_eq!(size, 2);
        assert_eq!(index.len().await, 2);

        let ids: Vec<i64> = index
            .search("q", 10)
            .await
            .expect("search")
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_current_entries() {
        let (index, _) = table_index(&[("Title: a\nContent: x", vec![0.0, 0.0])]);
        index.add(&doc(1, "a", "x")).await.expect("add");

        let error = index
            .rebuild_from(&[doc(1, "a", "x"), doc(2, "unknown", "text")])
            .await
            .expect_err("rebuild failure");
        assert!(matches!(error, IndexError::Embedding(_)));
        assert_eq!(index.len().await, 1);
    }
}
