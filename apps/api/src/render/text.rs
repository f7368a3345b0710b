//! Text extraction from rendered artifacts, for the judge.
//!
//! PDF parsing is CPU-bound, so it runs inside `tokio::task::spawn_blocking`.
//! When an artifact cannot be read back, callers fall back to the visible
//! text of the markup it was rendered from (`visible_text`).

use async_trait::async_trait;
use bytes::Bytes;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextExtractionError {
    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, artifact: Bytes) -> Result<String, TextExtractionError>;
}

/// Reads the text layer of a PDF with `pdf-extract`.
#[derive(Debug, Clone, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, artifact: Bytes) -> Result<String, TextExtractionError> {
        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&artifact)
                .map_err(|e| TextExtractionError::Pdf(format!("{e:?}")))
        })
        .await
        .map_err(|e| TextExtractionError::Task(e.to_string()))?
        .map(|text| collapse_whitespace(&text))
    }
}

/// Elements whose text never reaches the page.
const HIDDEN_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Visible text of an HTML document: the `<body>` text nodes outside
/// script-like elements, whitespace-collapsed.
pub fn visible_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let parts = match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .flat_map(collect_visible_text)
            .collect::<Vec<_>>(),
        Err(_) => collect_visible_text(document.root_element()),
    };
    collapse_whitespace(&parts.join(" "))
}

fn collect_visible_text(element: ElementRef) -> Vec<String> {
    if HIDDEN_TAGS.contains(&element.value().name()) {
        return Vec::new();
    }

    let mut parts = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    parts.extend(collect_visible_text(child_el));
                }
            }
            _ => {}
        }
    }
    parts
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
