//! Text processing for rulebook retrieval.
//!
//! This crate holds the pure, I/O-free half of the pipeline:
//!
//! - [`tokenizer`]: the [`Tokenizer`] seam and the `cl100k_base` implementation
//!   used to express chunk budgets in tokens.
//! - [`chunker`]: token-bounded, overlapping chunking of document pages.
//! - [`sentences`]: sentence spans and padded previews for evidence highlighting.
//! - [`section`]: section label detection for chunk payloads.

pub mod chunker;
pub mod section;
pub mod sentences;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tokenizer;

pub use chunker::{Chunk, ChunkError, ChunkOptions, Chunker};
pub use section::detect_section;
pub use sentences::{DEFAULT_PREVIEW_PAD, PreviewWindow, SentenceSpan, split_sentences, window_around};
pub use tokenizer::{TiktokenTokenizer, Tokenizer};
