//! rulebook-ai-retriever: ingestion and re-ranked retrieval for poker rulebooks
//!
//! This crate indexes rulebook documents into a vector store and answers
//! questions from them. Documents are split into token-bounded chunks,
//! embedded, and stored under deterministic point ids. Questions are
//! classified, embedded, searched with over-fetch, re-scored with soft boosts,
//! diversified per document, and optionally answered with citations.
//!
//! ## Key Modules
//!
//! - **[`ingest`]**: the ingestion pipeline (extract, chunk, embed, upsert)
//! - **[`search`]**: over-fetch, rescoring and the per-document diversity cap
//! - **[`rag`]**: `retrieve`, `answer` and evidence over a [`VectorIndex`]
//! - **[`index`]**: the vector index trait, Qdrant and in-memory backends
//! - **[`registry`]**: SQLite record of ingested document revisions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rulebook_ai_provider::{MistralChatProvider, MistralEmbedProvider, ProviderConfig};
//! use rulebook_ai_retriever::{AnswerMode, QdrantIndex, RagService, RetrieverConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrieverConfig::load(None)?;
//! let provider = ProviderConfig::from_env()?;
//! let service = RagService::from_config(
//!     &config,
//!     Arc::new(MistralEmbedProvider::new(provider.clone())?),
//!     Arc::new(MistralChatProvider::new(provider)?),
//!     Arc::new(QdrantIndex::new(&config.qdrant)?),
//! )?;
//! let answer = service.answer("Qui parle en premier au river ?", AnswerMode::Beginner, 12).await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! bytes → extract → chunk → embed → VectorIndex ← search ← classify + embed ← question
//!                                       ↓                           ↓
//!                                  registry                  evidence / answer
//! ```

pub mod addressing;
pub mod boost;
pub mod classify;
pub mod config;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod rag;
pub mod registry;
pub mod search;
pub mod similarity;

pub use boost::{DocBoostRule, DocBooster, DocBoosts};
pub use classify::{Classification, QueryClassifier};
pub use config::{IngestSettings, QdrantSettings, RetrieverConfig};
pub use error::{Result, RetrieverError};
pub use evidence::{Evidence, EvidenceOptions, select_evidence};
pub use extract::DocumentKind;
pub use index::{CollectionStatus, InMemoryIndex, IndexError, QdrantIndex, VectorIndex};
pub use ingest::{IngestReport, IngestRequest, Ingestor};
pub use rag::{Answer, AnswerMode, Context, RagService, Retrieval};
pub use registry::{DocumentRecord, DocumentRegistry};
pub use search::{RescoredHit, SearchEngine, SearchOptions};
