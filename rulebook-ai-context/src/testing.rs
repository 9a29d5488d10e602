//! Test doubles for token-counting code.
//!
//! Compiled for this crate's tests and, with the `test-util` feature, for
//! downstream crates.

use crate::tokenizer::Tokenizer;

/// One token per `w<n>` word, so counts and overlaps are exact.
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .filter_map(|w| w.strip_prefix('w').and_then(|n| n.parse().ok()))
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Option<String> {
        Some(
            tokens
                .iter()
                .map(|t| format!("w{t}"))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// `count` consecutive words `w0 w1 …`, one token each.
pub fn words(count: usize) -> String {
    (0..count)
        .map(|t| format!("w{t}"))
        .collect::<Vec<_>>()
        .join(" ")
}
