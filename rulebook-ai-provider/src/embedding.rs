//! Embedding providers
//!
//! An [`EmbeddingProvider`] maps an ordered batch of texts to one vector per
//! non-blank text. Callers own batching: the adapter sends whatever it is
//! given in a single request, so ingestion can validate token budgets between
//! batches and keep exactly one request in flight.

use crate::client::{ApiClient, PROVIDER_NAME};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, preserving order.
    ///
    /// Blank inputs are dropped before the call, so the result has one vector
    /// per non-blank input. A batch with no non-blank input returns an empty
    /// list without contacting the provider.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text, typically a query.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(ProviderError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.swap_remove(0))
    }

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Trim every input and drop the blank ones.
pub fn non_blank_inputs(texts: &[String]) -> Vec<&str> {
    texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Embedding provider backed by the Mistral `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct MistralEmbedProvider {
    client: ApiClient,
}

impl MistralEmbedProvider {
    /// Fails when the configuration has no API key.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(config)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.client.config().embedding_model
    }
}

#[async_trait]
impl EmbeddingProvider for MistralEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs = non_blank_inputs(texts);
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.model(),
            input: &inputs,
        };
        let mut response: EmbeddingResponse = self.client.post_json("embeddings", &request).await?;

        if response.data.len() != inputs.len() {
            return Err(ProviderError::CountMismatch {
                expected: inputs.len(),
                actual: response.data.len(),
            });
        }

        // The API reports each vector's input position; honour it over list order.
        if response.data.iter().all(|d| d.index.is_some()) {
            response.data.sort_by_key(|d| d.index);
        }

        tracing::debug!("Embedded {} texts with {}", inputs.len(), self.model());
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.client.config().embedding_dimension
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }
}
