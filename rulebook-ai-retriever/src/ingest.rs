//! Document ingestion: bytes in, indexed chunk points out.
//!
//! ```text
//! bytes ─► fingerprint ─► extract pages ─► chunk ─► ensure collection
//!                                                        │
//!        ┌───────────────────────────────────────────────┘
//!        ▼
//!   for each batch (sequential): token check ─► embed ─► count check ─► upsert
//!        │
//!        ▼
//!   delete stale tail chunks ─► record revision in the registry
//! ```
//!
//! Batches are never issued concurrently. Any failure aborts the run; points
//! already upserted stay in place and are overwritten by the next attempt,
//! since point ids depend only on `(doc_id, chunk_index)`.

use crate::addressing::{MAX_CHUNK_INDEX, fingerprint, point_id};
use crate::config::IngestSettings;
use crate::error::{Result, RetrieverError};
use crate::extract::{DocumentKind, extract_pages};
use crate::index::{CollectionStatus, Point, PointPayload, VectorIndex};
use crate::registry::{DocumentRecord, DocumentRegistry};
use chrono::Utc;
use rulebook_ai_context::{Chunk, Chunker, detect_section};
use rulebook_ai_provider::EmbeddingProvider;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// One document to ingest and the metadata stored with its chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
    pub doc_id: String,
    pub title: String,
    pub version: String,
    pub format: Vec<String>,
    pub phase: Vec<String>,
}

impl IngestRequest {
    /// A request titled after `doc_id` and versioned with today's date.
    pub fn new<S: Into<String>>(bytes: Vec<u8>, kind: DocumentKind, doc_id: S) -> Self {
        let doc_id = doc_id.into();
        Self {
            bytes,
            kind,
            title: doc_id.clone(),
            doc_id,
            version: Utc::now().format("%Y-%m-%d").to_string(),
            format: Vec::new(),
            phase: Vec::new(),
        }
    }

    pub fn with_title<S: Into<String>>(self, title: S) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    pub fn with_version<S: Into<String>>(self, version: S) -> Self {
        Self {
            version: version.into(),
            ..self
        }
    }

    pub fn with_tags(self, format: Vec<String>, phase: Vec<String>) -> Self {
        Self {
            format,
            phase,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub version: String,
    pub fingerprint: String,
    pub pages: usize,
    pub chunks_written: usize,
    pub collection: Option<CollectionStatus>,
    /// True when the registry already held this exact content.
    pub skipped: bool,
}

pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    registry: Option<DocumentRegistry>,
    settings: IngestSettings,
    allow_recreate: bool,
    skip_unchanged: bool,
}

impl Ingestor {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        settings: IngestSettings,
    ) -> Result<Self> {
        if settings.batch_size == 0 {
            return Err(RetrieverError::config("ingest.batch_size must be positive"));
        }
        Ok(Self {
            chunker,
            embedder,
            index,
            registry: None,
            settings,
            allow_recreate: true,
            skip_unchanged: false,
        })
    }

    pub fn with_registry(self, registry: DocumentRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..self
        }
    }

    pub fn with_allow_recreate(self, allow_recreate: bool) -> Self {
        Self {
            allow_recreate,
            ..self
        }
    }

    /// Skip documents whose latest registry entry has the same fingerprint.
    pub fn with_skip_unchanged(self, skip_unchanged: bool) -> Self {
        Self {
            skip_unchanged,
            ..self
        }
    }

    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestReport> {
        let hash = fingerprint(&request.bytes);
        let mut report = IngestReport {
            doc_id: request.doc_id.clone(),
            version: request.version.clone(),
            fingerprint: hash.clone(),
            pages: 0,
            chunks_written: 0,
            collection: None,
            skipped: false,
        };

        if self.skip_unchanged {
            if let Some(registry) = &self.registry {
                if let Some(latest) = registry.latest(&request.doc_id).await? {
                    if latest.fingerprint == hash {
                        info!("{} is unchanged since {}, skipping", request.doc_id, latest.ingested_at);
                        report.skipped = true;
                        return Ok(report);
                    }
                }
            }
        }

        let pages = extract_pages(&request.bytes, request.kind, &request.doc_id).await?;
        report.pages = pages.len();

        let chunks = self.chunker.chunk_pages(&pages);
        if chunks.len() > MAX_CHUNK_INDEX + 1 {
            return Err(RetrieverError::TooManyChunks {
                doc_id: request.doc_id.clone(),
                chunks: chunks.len(),
                limit: MAX_CHUNK_INDEX + 1,
            });
        }
        info!("{}: {} pages, {} chunks", request.doc_id, pages.len(), chunks.len());

        report.collection = Some(
            self.index
                .ensure_collection(self.embedder.embedding_dimension(), self.allow_recreate)
                .await?,
        );

        let total = chunks.len();
        for batch in chunks.chunks(self.settings.batch_size) {
            self.check_token_budget(batch)?;

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RetrieverError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| self.point(request, &hash, chunk, vector))
                .collect();
            self.index.upsert_points(points).await?;

            report.chunks_written += batch.len();
            info!("Upserted {} / {}", report.chunks_written, total);
        }

        self.index.delete_document_tail(&request.doc_id, total).await?;
        debug!("Removed chunks of {} at index {} and above", request.doc_id, total);

        if let Some(registry) = &self.registry {
            registry
                .record(&DocumentRecord {
                    doc_id: request.doc_id.clone(),
                    version: request.version.clone(),
                    title: request.title.clone(),
                    fingerprint: hash,
                    chunk_count: total,
                    ingested_at: Utc::now(),
                })
                .await?;
        }

        info!(
            "Finished: {} chunks of {} in collection {}",
            total,
            request.doc_id,
            self.index.collection_name()
        );
        Ok(report)
    }

    fn check_token_budget(&self, batch: &[Chunk]) -> Result<()> {
        for chunk in batch {
            let tokens = self.chunker.count_tokens(&chunk.text);
            if tokens > self.settings.token_ceiling {
                return Err(RetrieverError::TokenBudget {
                    chunk_index: chunk.chunk_index,
                    tokens,
                    limit: self.settings.token_ceiling,
                });
            }
        }
        Ok(())
    }

    fn point(&self, request: &IngestRequest, hash: &str, chunk: &Chunk, vector: Vec<f32>) -> Point {
        Point {
            id: point_id(&request.doc_id, chunk.chunk_index),
            vector,
            payload: PointPayload {
                text: chunk.text.clone(),
                doc_id: request.doc_id.clone(),
                title: request.title.clone(),
                section: detect_section(&chunk.text),
                page_start: chunk.page_start,
                page_end: chunk.page_end,
                format: request.format.clone(),
                phase: request.phase.clone(),
                version: request.version.clone(),
                hash: hash.to_string(),
                chunk_index: chunk.chunk_index,
            },
        }
    }
}
