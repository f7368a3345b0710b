use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_client::prompts::NOT_PROVIDED;

/// Fields every prompt renders, in this order.
pub const PROMPT_FIELDS: [(&str, &str); 4] = [
    ("name", "Name"),
    ("mission", "Mission"),
    ("purpose", "Purpose"),
    ("audience", "Intended Audience"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("club profile must include a non-empty 'name' field")]
    MissingName,
}

/// Free-text description of a club, keyed by lower-cased field name.
///
/// Unknown keys are kept but never interpreted. Missing fields render as
/// the "not provided" sentinel instead of being dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ClubProfile {
    fields: BTreeMap<String, String>,
}

impl ClubProfile {
    /// Parses the `key: value` profile format, one pair per line.
    ///
    /// Only the first colon splits, so values may contain colons (URLs, times).
    /// Lines without a colon or with an empty key are skipped.
    pub fn parse(text: &str) -> Self {
        let mut profile = ClubProfile::default();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                profile.insert(key, value);
            }
        }
        profile
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        self.fields.insert(key, value.trim().to_string());
    }

    /// Raw lookup; `None` when the field is absent or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&key.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Lookup for prompt rendering; absent fields become [`NOT_PROVIDED`].
    pub fn field(&self, key: &str) -> &str {
        self.get(key).unwrap_or(NOT_PROVIDED)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    /// Generation requires a name; everything else may be missing.
    pub fn validate(&self) -> Result<(), ProfileError> {
        match self.name() {
            Some(_) => Ok(()),
            None => Err(ProfileError::MissingName),
        }
    }

    /// Renders the prompt block (`Name: ...` lines) for the known fields.
    pub fn prompt_block(&self) -> String {
        PROMPT_FIELDS
            .iter()
            .map(|(key, label)| format!("{label}: {}", self.field(key)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<BTreeMap<String, String>> for ClubProfile {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut profile = ClubProfile::default();
        for (key, value) in &map {
            profile.insert(key, value);
        }
        profile
    }
}

impl From<ClubProfile> for BTreeMap<String, String> {
    fn from(profile: ClubProfile) -> Self {
        profile.fields
    }
}
