//! Vector index abstraction and collection reconciliation.
//!
//! The retrieval engine talks to its vector store through [`VectorIndex`], a
//! small async trait covering the operations it needs on one named
//! collection. Two implementations ship with the crate:
//!
//! - **[`QdrantIndex`]**: the Qdrant REST API, used in production.
//! - **[`InMemoryIndex`]**: a process-local collection with the same
//!   semantics, used by tests and offline runs.
//!
//! ## Reconciliation
//!
//! [`VectorIndex::ensure_collection`] makes the collection match the
//! embedding model's dimension. A missing collection is created with cosine
//! distance; a collection of the right size is left alone; a collection of any
//! other size is dropped and recreated empty. The rebuild loses every stored
//! point and callers must re-ingest afterwards. It can be refused with
//! `allow_recreate = false`, which turns the mismatch into
//! [`IndexError::DimensionMismatch`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;

/// Numeric point identifier, see [`crate::addressing::point_id`].
pub type PointId = u64;

/// Errors raised by vector index implementations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index answered with a non-2xx status.
    #[error("vector index returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response.
    #[error("vector index request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("could not decode vector index response: {message}")]
    Decode { message: String },

    /// The collection has the wrong vector size and rebuilding is disabled,
    /// or a point does not fit the collection.
    #[error("collection {collection} stores {actual}-dimensional vectors, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("collection {collection} does not exist")]
    MissingCollection { collection: String },
}

/// Everything stored next to a chunk vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointPayload {
    pub text: String,
    pub doc_id: String,
    pub title: String,
    pub section: String,
    pub page_start: usize,
    pub page_end: usize,
    pub format: Vec<String>,
    pub phase: Vec<String>,
    pub version: String,
    /// Fingerprint of the document revision the chunk came from.
    pub hash: String,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A nearest-neighbour match with its raw cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PointId,
    pub score: f32,
    pub payload: PointPayload,
}

/// Match-any tag filter: a point passes when it shares at least one format
/// tag or at least one phase tag with the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub format: Vec<String>,
    pub phase: Vec<String>,
}

impl TagFilter {
    pub fn new(format: Vec<String>, phase: Vec<String>) -> Self {
        Self { format, phase }
    }

    pub fn is_empty(&self) -> bool {
        self.format.is_empty() && self.phase.is_empty()
    }

    pub fn matches(&self, payload: &PointPayload) -> bool {
        let any = |wanted: &[String], present: &[String]| wanted.iter().any(|w| present.contains(w));
        any(&self.format, &payload.format) || any(&self.phase, &payload.phase)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    /// Hits scoring below this similarity are dropped by the index.
    pub score_threshold: Option<f32>,
    /// Ignored when empty.
    pub filter: Option<TagFilter>,
}

impl SimilarityQuery {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            score_threshold: None,
            filter: None,
        }
    }

    pub fn with_score_threshold(self, score_threshold: Option<f32>) -> Self {
        Self {
            score_threshold,
            ..self
        }
    }

    pub fn with_filter(self, filter: Option<TagFilter>) -> Self {
        Self {
            filter: filter.filter(|f| !f.is_empty()),
            ..self
        }
    }
}

/// Outcome of [`VectorIndex::ensure_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionStatus {
    Created,
    Unchanged,
    /// The collection was dropped and recreated; all points were lost.
    Recreated { previous: usize },
}

/// One named collection in a vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Configured vector size, or `None` when the collection does not exist.
    async fn collection_dimension(&self) -> Result<Option<usize>, IndexError>;

    /// Create the collection with cosine distance.
    async fn create_collection(&self, dimension: usize) -> Result<(), IndexError>;

    async fn delete_collection(&self) -> Result<(), IndexError>;

    /// Insert or overwrite points, returning once the write is durable.
    async fn upsert_points(&self, points: Vec<Point>) -> Result<(), IndexError>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn search(&self, query: &SimilarityQuery) -> Result<Vec<SearchHit>, IndexError>;

    /// Delete the points of `doc_id` whose `chunk_index` is at least
    /// `from_chunk_index`.
    async fn delete_document_tail(
        &self,
        doc_id: &str,
        from_chunk_index: usize,
    ) -> Result<(), IndexError>;

    /// Make the collection exist with vectors of `dimension`.
    ///
    /// Idempotent. On a size mismatch the collection is rebuilt empty, or
    /// [`IndexError::DimensionMismatch`] is returned when `allow_recreate` is
    /// false.
    async fn ensure_collection(
        &self,
        dimension: usize,
        allow_recreate: bool,
    ) -> Result<CollectionStatus, IndexError> {
        match self.collection_dimension().await? {
            None => {
                self.create_collection(dimension).await?;
                info!(
                    "Created collection {} with {}-dimensional vectors",
                    self.collection_name(),
                    dimension
                );
                Ok(CollectionStatus::Created)
            }
            Some(current) if current == dimension => Ok(CollectionStatus::Unchanged),
            Some(current) => {
                if !allow_recreate {
                    return Err(IndexError::DimensionMismatch {
                        collection: self.collection_name().to_string(),
                        expected: dimension,
                        actual: current,
                    });
                }
                warn!(
                    "Vector size mismatch on collection {}: current={}, expected={}. Recreating it; all stored points are dropped.",
                    self.collection_name(),
                    current,
                    dimension
                );
                self.delete_collection().await?;
                self.create_collection(dimension).await?;
                Ok(CollectionStatus::Recreated { previous: current })
            }
        }
    }
}
