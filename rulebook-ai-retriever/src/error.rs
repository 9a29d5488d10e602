//! Error taxonomy for ingestion and retrieval.
//!
//! Every variant aborts the current ingestion run or retrieval call. Two
//! conditions are deliberately absent because they never abort anything: a
//! collection whose vector size differs from the embedding model is rebuilt
//! (see [`crate::index::VectorIndex::ensure_collection`]), and a query whose
//! classification cannot be parsed proceeds without tags.

use crate::index::IndexError;
use rulebook_ai_context::ChunkError;
use rulebook_ai_provider::ProviderError;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// No page text could be obtained from the document bytes.
    #[error("extraction failed for {doc_id}: {message}")]
    Extraction { doc_id: String, message: String },

    /// A chunk exceeds the embedding provider's hard per-input ceiling.
    #[error("chunk {chunk_index} has {tokens} tokens, above the embedding limit of {limit}")]
    TokenBudget {
        chunk_index: usize,
        tokens: usize,
        limit: usize,
    },

    /// Embedding or chat provider failure, with status and body when available.
    #[error("provider error: {0}")]
    Provider(ProviderError),

    /// Vector index failure.
    #[error("vector index error: {0}")]
    Index(#[from] IndexError),

    /// The number of vectors returned differs from the number of texts sent.
    #[error("embedding count mismatch: sent {expected} texts, received {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    /// A document yields more chunks than point ids can address.
    #[error("{doc_id} produced {chunks} chunks, more than the {limit} a document may have")]
    TooManyChunks {
        doc_id: String,
        chunks: usize,
        limit: usize,
    },

    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    #[error("document registry error: {0}")]
    Registry(#[from] sqlx::Error),

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl RetrieverError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<ProviderError> for RetrieverError {
    fn from(err: ProviderError) -> Self {
        match err {
            // Misaligned vectors are an integrity failure, not a transport one.
            ProviderError::CountMismatch { expected, actual } => {
                Self::CountMismatch { expected, actual }
            }
            other => Self::Provider(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_count_mismatch_becomes_integrity_error() {
        let err: RetrieverError = ProviderError::CountMismatch {
            expected: 4,
            actual: 3,
        }
        .into();
        assert!(matches!(
            err,
            RetrieverError::CountMismatch {
                expected: 4,
                actual: 3
            }
        ));

        let err: RetrieverError = ProviderError::Http {
            provider: "mistral".into(),
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert!(matches!(err, RetrieverError::Provider(_)));
        assert!(err.to_string().contains("HTTP 500: boom"));
    }

    #[test]
    fn test_token_budget_names_the_chunk() {
        let err = RetrieverError::TokenBudget {
            chunk_index: 17,
            tokens: 8123,
            limit: 7900,
        };
        assert_eq!(
            err.to_string(),
            "chunk 17 has 8123 tokens, above the embedding limit of 7900"
        );
    }
}
