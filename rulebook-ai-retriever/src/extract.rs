//! Page text extraction from document bytes.
//!
//! PDFs are read page by page with `pdf-extract`. Plain-text rulebooks mark
//! page breaks with form feeds (`\x0C`); text without any form feed is a
//! single page. Every page is normalized, and a page left empty keeps its
//! position so page numbers match the source document.

use crate::error::{Result, RetrieverError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

const PAGE_BREAK: char = '\u{000C}';

static SPACE_BEFORE_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\n").expect("valid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// `.pdf` files are PDFs, everything else is read as UTF-8 text.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            _ => Self::Text,
        }
    }
}

/// Collapse whitespace runs before a newline and trim.
pub fn normalize_page(page: &str) -> String {
    SPACE_BEFORE_NEWLINE.replace_all(page, "\n").trim().to_string()
}

/// Split raw text on form feeds into normalized pages, empty ones included.
pub fn split_pages(raw: &str) -> Vec<String> {
    raw.split(PAGE_BREAK).map(normalize_page).collect()
}

/// Extract the pages of a document. Fails when no page has any text.
pub async fn extract_pages(bytes: &[u8], kind: DocumentKind, doc_id: &str) -> Result<Vec<String>> {
    let failure = |message: String| RetrieverError::Extraction {
        doc_id: doc_id.to_string(),
        message,
    };

    let pages = match kind {
        DocumentKind::Pdf => {
            let pdf_bytes = bytes.to_vec();
            tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem_by_pages(&pdf_bytes)
            })
            .await
            .map_err(|e| failure(format!("extraction task failed: {e}")))?
            .map_err(|e| failure(format!("PDF extraction error: {e}")))?
            .iter()
            .map(|page| normalize_page(page))
            .collect::<Vec<_>>()
        }
        DocumentKind::Text => {
            let raw = String::from_utf8(bytes.to_vec())
                .map_err(|e| failure(format!("document is not valid UTF-8: {e}")))?;
            split_pages(&raw)
        }
    };

    let with_text = pages.iter().filter(|page| !page.is_empty()).count();
    debug!(
        "Extracted {} pages from {} ({} with text), first page {} bytes",
        pages.len(),
        doc_id,
        with_text,
        pages.first().map_or(0, String::len)
    );

    if with_text == 0 {
        return Err(failure("no pages extracted".to_string()));
    }
    Ok(pages)
}
