//! # rulebook-ai-provider
//!
//! Async adapters to the hosted language-model provider used by the rulebook
//! retriever: batch text embeddings and chat completions. Both sit behind
//! small traits so the retrieval engine can be wired with substitute
//! providers in tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rulebook_ai_provider::{EmbeddingProvider, MistralEmbedProvider, ProviderConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = MistralEmbedProvider::new(ProviderConfig::from_env()?)?;
//!
//! let texts = vec!["Who burns the card?".to_string(), "   ".to_string()];
//! let vectors = provider.embed_batch(&texts).await?;
//!
//! // The blank input was dropped before the request.
//! assert_eq!(vectors.len(), 1);
//! assert_eq!(vectors[0].len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: endpoint, model and credential settings, readable from the environment
//! - [`embedding`]: the [`EmbeddingProvider`] trait and the Mistral implementation
//! - [`chat`]: the [`ChatProvider`] trait and the Mistral implementation
//! - [`envelope`]: decoding of chat responses with a documented priority order
//! - [`error`]: error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`ProviderError`]
//! type. HTTP failures keep the status code and raw body; a vector count that
//! does not match the number of inputs is reported as
//! [`ProviderError::CountMismatch`]. No call is retried.

pub mod chat;
mod client;
pub mod config;
pub mod embedding;
pub mod envelope;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod test_server;

// Re-export main types for easy access
pub use chat::{ChatCompletion, ChatMessage, ChatProvider, ChatRequest, MistralChatProvider, Role};
pub use config::ProviderConfig;
pub use embedding::{EmbeddingProvider, MistralEmbedProvider};
pub use envelope::decode_completion;
pub use error::{ProviderError, Result};
