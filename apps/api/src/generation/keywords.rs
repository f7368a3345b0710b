//! Keyword extraction: turns a club profile into visual image-search terms.
//!
//! One call, no retry. Any failure degrades to an empty set: "no keywords"
//! is a valid input to image sourcing, never a pipeline error.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::generation::prompts::{KEYWORD_MAX_TOKENS, KEYWORD_PROMPT_TEMPLATE, KEYWORD_TEMPERATURE};
use crate::llm_client::{ChatMessage, CompletionRequest, TextGenerator};
use crate::models::club::ClubProfile;

pub const MAX_KEYWORDS: usize = 10;

/// Ordered, case-insensitively unique search terms. Order is relevance order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Parses a comma-separated model reply.
    pub fn from_reply(reply: &str) -> Self {
        let mut set = KeywordSet::default();
        for raw in reply.split([',', '\n']) {
            if set.0.len() >= MAX_KEYWORDS {
                break;
            }
            set.push(raw);
        }
        set
    }

    fn push(&mut self, raw: &str) {
        let term = clean_term(raw);
        if term.is_empty() {
            return;
        }
        let lowered = term.to_lowercase();
        if self.0.iter().any(|k| k.to_lowercase() == lowered) {
            return;
        }
        self.0.push(term);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Trims whitespace, list numbering, quotes and trailing periods.
fn clean_term(raw: &str) -> String {
    let term = strip_list_marker(raw.trim()).trim();
    term.trim_matches(['"', '\'', '`'])
        .trim_end_matches('.')
        .trim()
        .to_string()
}

/// Drops a leading `1.`, `2)`, `-` or `*`, leaving terms like "3D printing" alone.
fn strip_list_marker(term: &str) -> &str {
    let after_digits = term.trim_start_matches(|c: char| c.is_ascii_digit());
    if after_digits.len() < term.len() {
        return after_digits.strip_prefix(['.', ')']).unwrap_or(term);
    }
    term.trim_start_matches(['-', '*'])
}

pub fn keyword_request(profile: &ClubProfile) -> CompletionRequest {
    let prompt = KEYWORD_PROMPT_TEMPLATE.replace("{profile_block}", &profile.prompt_block());
    CompletionRequest::new(vec![ChatMessage::user(prompt)], KEYWORD_MAX_TOKENS)
        .with_temperature(KEYWORD_TEMPERATURE)
}

/// Extracts up to [`MAX_KEYWORDS`] terms. Never fails.
pub async fn extract_keywords(profile: &ClubProfile, llm: &dyn TextGenerator) -> KeywordSet {
    match llm.complete(&keyword_request(profile)).await {
        Ok(reply) => {
            let keywords = KeywordSet::from_reply(&reply);
            if keywords.is_empty() {
                warn!("Keyword extraction returned no usable terms");
            } else {
                info!("Extracted {} keywords", keywords.len());
            }
            keywords
        }
        Err(e) => {
            warn!("Keyword extraction failed, continuing without keywords: {e}");
            KeywordSet::default()
        }
    }
}
