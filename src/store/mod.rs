//! SQLite-backed document persistence.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver reported a failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persisted medical note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    /// Identifier assigned by the store.
    pub id: i64,
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
}

const CREATE_DOCUMENTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS documents (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    title TEXT NOT NULL, \
    content TEXT NOT NULL\
)";

/// Document repository over a SQLite connection pool.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Open (creating if missing) the database at `database_url` and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = if is_in_memory(database_url) {
            // Every connection to `:memory:` opens a fresh database; keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(database_url, "Document store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_DOCUMENTS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a document and return it with its assigned identifier.
    pub async fn create(&self, title: &str, content: &str) -> Result<Document, StoreError> {
        let result = sqlx::query("INSERT INTO documents (title, content) VALUES (?, ?)")
            .bind(title)
            .bind(content)
            .execute(&self.pool)
            .await?;
        let id = result.last_insert_rowid();
        tracing::debug!(document_id = id, "Document created");
        Ok(Document {
            id,
            title: title.to_string(),
            content: content.to_string(),
        })
    }

    /// Return up to `limit` documents in insertion order, skipping the first `skip`.
    pub async fn list(&self, skip: u32, limit: u32) -> Result<Vec<Document>, StoreError> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, title, content FROM documents ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(skip))
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }

    /// Fetch a single document by identifier.
    pub async fn get(&self, id: i64) -> Result<Option<Document>, StoreError> {
        let document = sqlx::query_as::<_, Document>(
            "SELECT id, title, content FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    /// Return every document in insertion order.
    pub async fn all(&self) -> Result<Vec<Document>, StoreError> {
        let documents =
            sqlx::query_as::<_, Document>("SELECT id, title, content FROM documents ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(documents)
    }

    /// Close the underlying pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
