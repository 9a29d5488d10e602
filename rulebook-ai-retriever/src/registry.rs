//! SQLite record of ingested document revisions.
//!
//! The vector index only knows chunks. The registry remembers which revision
//! of each document was ingested, so the CLI can list the corpus and ingestion
//! can skip a file whose bytes have not changed.
//!
//! ```sql
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     doc_id TEXT NOT NULL,
//!     version TEXT NOT NULL,
//!     title TEXT NOT NULL,
//!     fingerprint TEXT NOT NULL,    -- sha256:<hex> of the source bytes
//!     chunk_count INTEGER NOT NULL,
//!     ingested_at TIMESTAMP NOT NULL,
//!     UNIQUE(doc_id, version)
//! );
//! ```

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub version: String,
    pub title: String,
    pub fingerprint: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct DocumentRegistry {
    pool: SqlitePool,
}

impl DocumentRegistry {
    /// Open (or create) the registry database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// In-memory registry, for tests and one-off runs.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL,
                version TEXT NOT NULL,
                title TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TIMESTAMP NOT NULL,
                CONSTRAINT unique_revision UNIQUE(doc_id, version)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_doc_id ON documents(doc_id)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert a revision, or refresh it when `(doc_id, version)` exists.
    pub async fn record(&self, record: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (doc_id, version, title, fingerprint, chunk_count, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_id, version) DO UPDATE SET
                title = excluded.title,
                fingerprint = excluded.fingerprint,
                chunk_count = excluded.chunk_count,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&record.doc_id)
        .bind(&record.version)
        .bind(&record.title)
        .bind(&record.fingerprint)
        .bind(record.chunk_count as i64)
        .bind(record.ingested_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recently ingested revision of `doc_id`.
    pub async fn latest(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT doc_id, version, title, fingerprint, chunk_count, ingested_at
            FROM documents
            WHERE doc_id = ?
            ORDER BY ingested_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Every recorded revision, grouped by document, newest first.
    pub async fn list(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id, version, title, fingerprint, chunk_count, ingested_at
            FROM documents
            ORDER BY doc_id, ingested_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}

fn record_from_row(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        doc_id: row.get("doc_id"),
        version: row.get("version"),
        title: row.get("title"),
        fingerprint: row.get("fingerprint"),
        chunk_count: row.get::<i64, _>("chunk_count") as usize,
        ingested_at: row.get("ingested_at"),
    }
}
