//! Markup extraction: recovers an HTML document from free-form model output.
//!
//! Ordered fallback chain, applied after stripping code fences:
//!   1. `<!DOCTYPE html` … first `</html>` after it → `Extracted` (inclusive span)
//!   2. `<!DOCTYPE html` with no closing tag      → `Truncated` (to end of text)
//!   3. minimal `<html …>…</html>` structural match → `Extracted` (first match)
//!   4. nothing recognizable                        → `NotFound`
//!
//! A truncated document is a normal outcome, not an error. Only `NotFound`
//! becomes an [`ExtractionError`], and no substring is ever guessed from prose.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::generation::generator::RawCandidate;
use crate::llm_client::{strip_code_fences, MODEL};

const START_TOKEN: &str = "<!doctype html";
const END_TOKEN: &str = "</html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupExtraction {
    Extracted(String),
    /// The model stopped before closing the document.
    Truncated(String),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no structured content found in model output")]
pub struct ExtractionError;

impl MarkupExtraction {
    pub fn into_result(self) -> Result<String, ExtractionError> {
        match self {
            MarkupExtraction::Extracted(markup) | MarkupExtraction::Truncated(markup) => Ok(markup),
            MarkupExtraction::NotFound => Err(ExtractionError),
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, MarkupExtraction::Truncated(_))
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    /// Upstream attempt (1-based) that produced the batch.
    pub attempt: u32,
    pub generation_model: String,
    /// The document had no closing tag.
    pub truncated: bool,
    /// Set once a judge has scored the candidate.
    pub judged_by: Option<String>,
}

/// An extracted candidate document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// 0-based position in the generated batch. Labels derive from it.
    pub index: usize,
    pub markup: String,
    pub provenance: Provenance,
}

impl Candidate {
    /// Stable label used in judge prompts and storage keys.
    pub fn label(&self) -> String {
        candidate_label(self.index)
    }
}

pub fn candidate_label(index: usize) -> String {
    format!("Candidate {}", index + 1)
}

/// Extracts one raw segment into a candidate, replacing its text with the markup.
pub fn extract_candidate(raw: RawCandidate) -> Result<Candidate, ExtractionError> {
    let extraction = extract_markup(&raw.text);
    let truncated = extraction.is_truncated();
    let markup = extraction.into_result()?;
    Ok(Candidate {
        index: raw.index,
        markup,
        provenance: Provenance {
            attempt: raw.attempt,
            generation_model: MODEL.to_string(),
            truncated,
            judged_by: None,
        },
    })
}

fn html_element() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<html\b[^>]*>.*?</html\s*>").expect("static regex"))
}

/// Runs the fallback chain over one raw model segment.
pub fn extract_markup(raw: &str) -> MarkupExtraction {
    let text = strip_code_fences(raw);

    // ASCII lowering keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();

    if let Some(start) = lowered.find(START_TOKEN) {
        return match lowered[start..].find(END_TOKEN) {
            Some(rel_end) => {
                let end = start + rel_end + END_TOKEN.len();
                MarkupExtraction::Extracted(text[start..end].to_string())
            }
            None => MarkupExtraction::Truncated(text[start..].trim_end().to_string()),
        };
    }

    match html_element().find(text) {
        Some(m) => MarkupExtraction::Extracted(m.as_str().to_string()),
        None => MarkupExtraction::NotFound,
    }
}
