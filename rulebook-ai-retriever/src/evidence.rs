//! Sentence-level evidence for retrieved contexts.
//!
//! Each of the best-ranked contexts is split into sentences, every sentence is
//! embedded and compared with the question vector, and the closest sentences
//! are returned with a padded preview for highlighting. Contexts are embedded
//! concurrently; results keep context rank order, so the global cap drops
//! evidence from the lowest-ranked contexts first.

use crate::error::{Result, RetrieverError};
use crate::rag::Context;
use crate::similarity::cosine_similarity;
use futures::future::try_join_all;
use rulebook_ai_context::{DEFAULT_PREVIEW_PAD, split_sentences, window_around};
use rulebook_ai_provider::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on evidence returned by one selection.
pub const MAX_EVIDENCE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceOptions {
    /// Sentences kept per context.
    pub max_per_doc: usize,
    /// Contexts examined, taken from the top of the ranking.
    pub limit_docs: usize,
    /// Evidence returned overall, at most [`MAX_EVIDENCE`].
    pub max_total: usize,
    /// Characters of surrounding text on each side of the sentence.
    pub pad: usize,
}

impl Default for EvidenceOptions {
    fn default() -> Self {
        Self {
            max_per_doc: 2,
            limit_docs: 6,
            max_total: MAX_EVIDENCE,
            pad: DEFAULT_PREVIEW_PAD,
        }
    }
}

impl EvidenceOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_per_doc == 0 || self.limit_docs == 0 || self.max_total == 0 {
            return Err(RetrieverError::config(
                "evidence.max_per_doc, evidence.limit_docs and evidence.max_total must be positive",
            ));
        }
        if self.max_total > MAX_EVIDENCE {
            return Err(RetrieverError::config(format!(
                "evidence.max_total ({}) exceeds {MAX_EVIDENCE}",
                self.max_total
            )));
        }
        Ok(())
    }
}

/// A sentence supporting an answer, with the context it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(flatten)]
    pub context: Context,
    pub sent_text: String,
    /// Sentence similarity to the question.
    pub sent_score: f32,
    /// Byte offsets of the sentence in the context text.
    pub abs_start: usize,
    pub abs_end: usize,
    pub preview: String,
    /// Byte offsets of the sentence in `preview`.
    pub rel_start: usize,
    pub rel_end: usize,
}

async fn evidence_for_context(
    embedder: &dyn EmbeddingProvider,
    query_vector: &[f32],
    context: &Context,
    options: &EvidenceOptions,
) -> Result<Vec<Evidence>> {
    let sentences = split_sentences(&context.text);
    if sentences.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != sentences.len() {
        return Err(RetrieverError::CountMismatch {
            expected: sentences.len(),
            actual: vectors.len(),
        });
    }

    let mut scored: Vec<(f32, _)> = vectors
        .iter()
        .map(|v| cosine_similarity(query_vector, v))
        .zip(sentences)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    Ok(scored
        .into_iter()
        .take(options.max_per_doc)
        .map(|(score, sentence)| {
            let window = window_around(&context.text, sentence.start, sentence.end, options.pad);
            Evidence {
                context: context.clone(),
                sent_text: sentence.text,
                sent_score: score,
                abs_start: sentence.start,
                abs_end: sentence.end,
                preview: window.preview,
                rel_start: window.rel_start,
                rel_end: window.rel_end,
            }
        })
        .collect())
}

/// Best sentences of the first `limit_docs` contexts, at most `max_total`
/// and never more than [`MAX_EVIDENCE`].
pub async fn select_evidence(
    embedder: &dyn EmbeddingProvider,
    query_vector: &[f32],
    contexts: &[Context],
    options: &EvidenceOptions,
) -> Result<Vec<Evidence>> {
    let per_context = try_join_all(
        contexts
            .iter()
            .take(options.limit_docs)
            .map(|context| evidence_for_context(embedder, query_vector, context, options)),
    )
    .await?;

    let mut evidence: Vec<Evidence> = per_context.into_iter().flatten().collect();
    evidence.truncate(options.max_total.min(MAX_EVIDENCE));
    debug!("Selected {} evidence sentences", evidence.len());
    Ok(evidence)
}
