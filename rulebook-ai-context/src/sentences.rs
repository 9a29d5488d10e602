//! Sentence spans and highlight previews.
//!
//! Evidence highlighting works on byte offsets into the chunk text. A sentence
//! is a run of non-terminator characters followed by one or more of `.`, `!`,
//! `?` or `…`; whatever trails the last terminator is kept as a final
//! sentence. Spans are trimmed, so `&text[span.start..span.end] == span.text`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Default number of characters kept on each side of a highlighted sentence.
pub const DEFAULT_PREVIEW_PAD: usize = 280;

static SENTENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^.!?…]+(?:[.!?…]+|$)").expect("sentence pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A padded excerpt around a sentence, with the sentence located inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewWindow {
    pub preview: String,
    /// Byte offset of the sentence start within `preview`.
    pub rel_start: usize,
    /// Byte offset of the sentence end within `preview`.
    pub rel_end: usize,
}

/// Split `text` into trimmed, non-empty sentence spans in reading order.
///
/// Text made only of terminators (`"..."`) comes back as a single span.
pub fn split_sentences(text: &str) -> Vec<SentenceSpan> {
    let mut spans: Vec<SentenceSpan> = SENTENCE_PATTERN
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            let start = m.start() + (raw.len() - raw.trim_start().len());
            Some(SentenceSpan {
                start,
                end: start + trimmed.len(),
                text: trimmed.to_string(),
            })
        })
        .collect();

    if spans.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let start = text.len() - text.trim_start().len();
            spans.push(SentenceSpan {
                start,
                end: start + trimmed.len(),
                text: trimmed.to_string(),
            });
        }
    }

    spans
}

/// Cut a preview of `text` reaching `pad` characters before `start` and after
/// `end`, clipped to the text and trimmed.
///
/// Offsets that fall inside a multi-byte character are moved to the nearest
/// enclosing boundary. The returned offsets always satisfy
/// `rel_start <= rel_end <= preview.len()`.
pub fn window_around(text: &str, start: usize, end: usize, pad: usize) -> PreviewWindow {
    let start = floor_boundary(text, start.min(text.len()));
    let end = ceil_boundary(text, end.clamp(start, text.len()));

    let window_start = text[..start]
        .char_indices()
        .rev()
        .take(pad)
        .last()
        .map_or(start, |(i, _)| i);
    let window_end = end
        + text[end..]
            .chars()
            .take(pad)
            .map(char::len_utf8)
            .sum::<usize>();

    let raw = &text[window_start..window_end];
    let leading = raw.len() - raw.trim_start().len();
    let preview = raw.trim();

    let rel_start = (start - window_start)
        .saturating_sub(leading)
        .min(preview.len());
    let rel_end = (end - window_start)
        .saturating_sub(leading)
        .clamp(rel_start, preview.len());

    PreviewWindow {
        preview: preview.to_string(),
        rel_start,
        rel_end,
    }
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
