//! Token-bounded page chunking.
//!
//! Pages are chunked independently: a page that fits in the token budget is
//! emitted verbatim, a longer page is cut into sliding windows of
//! `max_tokens` tokens that advance by `max_tokens - overlap_tokens`. Chunks
//! never span two pages, and `chunk_index` runs across the whole document.
//!
//! ```
//! use std::sync::Arc;
//! use rulebook_ai_context::{ChunkOptions, Chunker, TiktokenTokenizer};
//!
//! let tokenizer = Arc::new(TiktokenTokenizer::cl100k().unwrap());
//! let chunker = Chunker::new(tokenizer, ChunkOptions::default()).unwrap();
//!
//! let pages = vec!["Règle 1 : le bouton tourne.".to_string(), "   ".to_string(), "Règle 2.".to_string()];
//! let chunks = chunker.chunk_pages(&pages);
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].chunk_index, 1);
//! assert_eq!(chunks[1].page_start, 3);
//! ```

use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Default window size in tokens.
pub const DEFAULT_MAX_TOKENS: usize = 1100;
/// Default number of tokens shared by consecutive windows of one page.
pub const DEFAULT_OVERLAP_TOKENS: usize = 180;

/// Errors raised while configuring or running the chunker.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The window would never advance.
    #[error(
        "overlap_tokens ({overlap_tokens}) must be smaller than max_tokens ({max_tokens})"
    )]
    InvalidWindow {
        max_tokens: usize,
        overlap_tokens: usize,
    },

    /// The tokenizer could not be loaded.
    #[error("tokenizer unavailable: {message}")]
    Tokenizer { message: String },
}

/// A token-bounded slice of one page of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// 1-indexed page the chunk was cut from.
    pub page_start: usize,
    /// Always equal to `page_start`; chunks never cross pages.
    pub page_end: usize,
    /// Position of the chunk in the document, starting at 0 with no gaps.
    pub chunk_index: usize,
}

/// Window configuration for [`Chunker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkOptions {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_tokens: DEFAULT_OVERLAP_TOKENS,
        }
    }
}

impl ChunkOptions {
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
        }
    }

    /// Reject windows that cannot make progress.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.max_tokens == 0 || self.overlap_tokens >= self.max_tokens {
            return Err(ChunkError::InvalidWindow {
                max_tokens: self.max_tokens,
                overlap_tokens: self.overlap_tokens,
            });
        }
        Ok(())
    }

    /// Distance between the starts of two consecutive windows.
    pub fn step(&self) -> usize {
        self.max_tokens - self.overlap_tokens
    }
}

/// Splits page texts into overlapping token windows.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    options: ChunkOptions,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("options", &self.options)
            .finish()
    }
}

impl Chunker {
    /// Create a chunker, validating the window configuration up front.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, options: ChunkOptions) -> Result<Self, ChunkError> {
        options.validate()?;
        Ok(Self { tokenizer, options })
    }

    pub fn options(&self) -> ChunkOptions {
        self.options
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text)
    }

    /// Chunk an ordered list of pages.
    ///
    /// Empty and whitespace-only pages are skipped and consume no
    /// `chunk_index`; page numbers still follow the input positions.
    pub fn chunk_pages<S: AsRef<str>>(&self, pages: &[S]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (i, page) in pages.iter().enumerate() {
            let page_text = page.as_ref().trim();
            if page_text.is_empty() {
                continue;
            }

            for piece in self.split_text(page_text) {
                chunks.push(Chunk {
                    text: piece,
                    page_start: i + 1,
                    page_end: i + 1,
                    chunk_index: chunks.len(),
                });
            }
        }

        chunks
    }

    /// Cut one text into windows of at most `max_tokens` tokens.
    ///
    /// Text that already fits is returned unchanged. Otherwise the last
    /// window may be shorter than `max_tokens`.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let tokens = self.tokenizer.encode(text);
        let max_tokens = self.options.max_tokens;
        if tokens.len() <= max_tokens {
            return vec![text.to_string()];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + max_tokens).min(tokens.len());
            match self.decode_window(&tokens, start, end) {
                Some(piece) if !piece.trim().is_empty() => pieces.push(piece),
                Some(_) => {}
                None => warn!(
                    "Dropped undecodable token window {}..{} of {} tokens",
                    start,
                    end,
                    tokens.len()
                ),
            }
            if end == tokens.len() {
                break;
            }
            start += self.options.step();
        }
        pieces
    }

    // A window edge can split a multi-byte character across tokens. Shrink the
    // window by up to three tokens on either side until it decodes; shrinking
    // keeps the token bound intact.
    fn decode_window(&self, tokens: &[u32], start: usize, end: usize) -> Option<String> {
        for s in start..(start + 4).min(end) {
            for e in ((s + 1).max(end.saturating_sub(3))..=end).rev() {
                if let Some(text) = self.tokenizer.decode(&tokens[s..e]) {
                    return Some(text);
                }
            }
        }
        None
    }
}
