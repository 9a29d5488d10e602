//! Token counting and windowed encode/decode.
//!
//! Chunk budgets are expressed in tokens of a fixed BPE scheme (`cl100k_base`,
//! the encoding shared by the chat and embedding models the retriever talks
//! to). The [`Tokenizer`] trait keeps the chunker independent of the concrete
//! encoding so tests can substitute a word-level tokenizer with predictable
//! counts.

use crate::chunker::ChunkError;

/// A reversible text ↔ token-sequence mapping.
pub trait Tokenizer: Send + Sync {
    /// Encode `text` into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a token window back into text.
    ///
    /// Returns `None` when the window does not decode to valid UTF-8, which
    /// happens when a window boundary falls inside a multi-byte character.
    fn decode(&self, tokens: &[u32]) -> Option<String>;

    /// Number of tokens in `text`.
    fn count_tokens(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `cl100k_base` tokenizer backed by `tiktoken-rs`.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl TiktokenTokenizer {
    /// Load the `cl100k_base` ranks bundled with `tiktoken-rs`.
    ///
    /// Loading parses the whole rank table, so build one instance and share it.
    pub fn cl100k() -> Result<Self, ChunkError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ChunkError::Tokenizer {
            message: e.to_string(),
        })?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        // Special-token markup inside rule documents is plain text.
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Option<String> {
        self.bpe
            .decode(tokens.iter().map(|&t| t as _).collect())
            .ok()
    }
}
