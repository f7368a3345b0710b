//! Content Generator: produces N raw candidate documents in one upstream call.
//!
//! Flow: build prompt → call the generative service under the retry policy →
//! split the reply on the version delimiter. Exhausted retries fail the whole
//! batch; no candidate is ever fabricated.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::generation::images::ImageAsset;
use crate::generation::prompts::{
    GENERATION_MAX_TOKENS_CAP, GENERATION_MAX_TOKENS_PER_CANDIDATE, GENERATION_PROMPT_TEMPLATE,
    IMAGE_SECTION_TEMPLATE, MULTI_FORMAT_TEMPLATE, TEMPLATE_SECTION_TEMPLATE, VERSION_DELIMITER,
};
use crate::generation::retry::{RetryError, RetryPolicy};
use crate::llm_client::prompts::{
    DOCUMENT_CREATOR_SYSTEM, FACTS_ONLY_INSTRUCTION, MARKUP_ONLY_INSTRUCTION,
};
use crate::llm_client::{ChatMessage, CompletionRequest, TextGenerator};
use crate::models::club::{ClubProfile, ProfileError};

pub const DEFAULT_DOCUMENT_TYPE: &str = "poster";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("candidate count must be at least 1")]
    ZeroCandidates,

    #[error("content generation failed: {0}")]
    Service(RetryError<ServiceError>),

    #[error("generative service returned an empty response")]
    EmptyResponse,
}

// ────────────────────────────────────────────────────────────────────────────
// Request
// ────────────────────────────────────────────────────────────────────────────

/// Everything one generation call needs. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    profile: ClubProfile,
    document_type: String,
    templates: Vec<String>,
    images: Vec<ImageAsset>,
    candidate_count: usize,
}

impl GenerationRequest {
    pub fn new(
        profile: ClubProfile,
        document_type: impl Into<String>,
        candidate_count: usize,
    ) -> Result<Self, GenerationError> {
        profile.validate()?;
        if candidate_count == 0 {
            return Err(GenerationError::ZeroCandidates);
        }
        let document_type = document_type.into();
        let document_type = match document_type.trim() {
            "" => DEFAULT_DOCUMENT_TYPE.to_string(),
            t => t.to_string(),
        };
        Ok(Self {
            profile,
            document_type,
            templates: Vec::new(),
            images: Vec::new(),
            candidate_count,
        })
    }

    pub fn with_templates(mut self, templates: Vec<String>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAsset>) -> Self {
        self.images = images;
        self
    }

    pub fn profile(&self) -> &ClubProfile {
        &self.profile
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }

    pub fn candidate_count(&self) -> usize {
        self.candidate_count
    }
}

/// One unextracted segment of the model's reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawCandidate {
    /// 0-based position within the batch.
    pub index: usize,
    pub text: String,
    /// Which upstream attempt produced the batch.
    pub attempt: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt
// ────────────────────────────────────────────────────────────────────────────

pub fn build_prompt(request: &GenerationRequest) -> CompletionRequest {
    let n = request.candidate_count;

    let count_instruction = if n == 1 {
        "Create one visually striking and creative version".to_string()
    } else {
        format!("Create {n} visually striking and creative versions")
    };

    let template_section = if request.templates.is_empty() {
        String::new()
    } else {
        TEMPLATE_SECTION_TEMPLATE.replace("{templates}", &request.templates.join("\n\n"))
    };

    let image_section = if request.images.is_empty() {
        String::new()
    } else {
        let list = request
            .images
            .iter()
            .map(|img| format!("  - {} (found for \"{}\")", img.uri, img.keyword))
            .collect::<Vec<_>>()
            .join("\n");
        IMAGE_SECTION_TEMPLATE.replace("{image_list}", &list)
    };

    let format_instruction = if n == 1 {
        MARKUP_ONLY_INSTRUCTION.to_string()
    } else {
        MULTI_FORMAT_TEMPLATE
            .replace("{count}", &n.to_string())
            .replace("{delimiter}", VERSION_DELIMITER)
    };

    let prompt = GENERATION_PROMPT_TEMPLATE
        .replace("{count_instruction}", &count_instruction)
        .replace("{document_type}", &request.document_type)
        .replace("{profile_block}", &request.profile.prompt_block())
        .replace("{template_section}", &template_section)
        .replace("{image_section}", &image_section)
        .replace("{format_instruction}", &format_instruction)
        .replace("{facts_instruction}", FACTS_ONLY_INSTRUCTION);

    let max_tokens = (GENERATION_MAX_TOKENS_PER_CANDIDATE * n as u32).min(GENERATION_MAX_TOKENS_CAP);

    CompletionRequest::new(
        vec![ChatMessage::system(DOCUMENT_CREATOR_SYSTEM), ChatMessage::user(prompt)],
        max_tokens,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Generation
// ────────────────────────────────────────────────────────────────────────────

pub async fn generate_candidates(
    request: &GenerationRequest,
    llm: &dyn TextGenerator,
    policy: &RetryPolicy,
) -> Result<Vec<RawCandidate>, GenerationError> {
    let completion = build_prompt(request);

    let reply = policy
        .run_service("generate_content", |_| llm.complete(&completion))
        .await
        .map_err(GenerationError::Service)?;

    let segments = split_candidates(&reply.value, request.candidate_count);
    if segments.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    info!(
        attempt = reply.attempt,
        "Generated {} of {} requested candidates",
        segments.len(),
        request.candidate_count
    );

    Ok(segments
        .into_iter()
        .enumerate()
        .map(|(index, text)| RawCandidate {
            index,
            text,
            attempt: reply.attempt,
        })
        .collect())
}

/// Splits a reply into at most `expected` trimmed, non-empty segments.
///
/// A reply without the delimiter is one candidate.
pub fn split_candidates(reply: &str, expected: usize) -> Vec<String> {
    let mut segments: Vec<String> = reply
        .split(VERSION_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if segments.len() > expected {
        warn!(
            "Model returned {} documents for {} requested; keeping the first {}",
            segments.len(),
            expected,
            expected
        );
        segments.truncate(expected);
    } else if segments.len() < expected && !segments.is_empty() {
        warn!(
            "Model returned {} documents for {} requested",
            segments.len(),
            expected
        );
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::test_support::{chess_club, poster, ScriptedGenerator};
    use crate::llm_client::Role;

    fn request(n: usize) -> GenerationRequest {
        GenerationRequest::new(chess_club(), "poster", n).unwrap()
    }

    #[test]
    fn test_request_requires_name() {
        let mut profile = ClubProfile::default();
        profile.insert("mission", "Teach strategy");
        let err = GenerationRequest::new(profile, "poster", 3).unwrap_err();
        assert!(matches!(err, GenerationError::Profile(ProfileError::MissingName)));
    }

    #[test]
    fn test_request_requires_a_candidate() {
        let err = GenerationRequest::new(chess_club(), "poster", 0).unwrap_err();
        assert!(matches!(err, GenerationError::ZeroCandidates));
    }

    #[test]
    fn test_blank_document_type_defaults_to_poster() {
        let req = GenerationRequest::new(chess_club(), "  ", 1).unwrap();
        assert_eq!(req.document_type(), "poster");
    }

    #[test]
    fn test_split_exact_delimiter_count() {
        let reply = "A\n---VERSION---\n  B  \n---VERSION---\nC";
        assert_eq!(split_candidates(reply, 3), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_split_drops_empty_segments() {
        let reply = "---VERSION---\nA\n---VERSION---\n   \n---VERSION---\nB\n---VERSION---";
        assert_eq!(split_candidates(reply, 3), vec!["A", "B"]);
    }

    #[test]
    fn test_split_without_delimiter_is_one_candidate() {
        assert_eq!(split_candidates("  <html></html>\n", 3), vec!["<html></html>"]);
    }

    #[test]
    fn test_split_truncates_extra_documents() {
        let reply = "A---VERSION---B---VERSION---C---VERSION---D";
        assert_eq!(split_candidates(reply, 2), vec!["A", "B"]);
    }

    #[test]
    fn test_prompt_for_three_candidates() {
        let images = vec![ImageAsset {
            uri: "https://images.unsplash.com/chess".into(),
            keyword: "chess".into(),
        }];
        let req = request(3)
            .with_templates(vec!["<html>template one</html>".into()])
            .with_images(images);
        let completion = build_prompt(&req);

        assert_eq!(completion.messages[0].role, Role::System);
        let prompt = &completion.messages[1].content;
        assert!(prompt.starts_with("Create 3 visually striking and creative versions of a poster"));
        assert!(prompt.contains("Name: Chess Club"));
        assert!(prompt.contains("Intended Audience: Students"));
        assert!(prompt.contains("<html>template one</html>"));
        assert!(prompt.contains("https://images.unsplash.com/chess"));
        assert!(prompt.contains("separated by \"---VERSION---\" markers"));
        assert!(!prompt.contains("{profile_block}"));
        assert!(!prompt.contains("{facts_instruction}"));
        assert_eq!(completion.max_tokens, 9000);
    }

    #[test]
    fn test_prompt_for_single_candidate_has_no_delimiter() {
        let prompt = build_prompt(&request(1)).messages[1].content.clone();
        assert!(prompt.starts_with("Create one visually striking"));
        assert!(!prompt.contains(VERSION_DELIMITER));
        assert!(!prompt.contains("image URLs"));
    }

    #[tokio::test]
    async fn test_generate_candidates_records_attempt() {
        let reply = format!("{}\n---VERSION---\n{}", poster("One"), poster("Two"));
        let llm = ScriptedGenerator::new(vec![
            Err(ServiceError::Upstream { status: 529, message: "overloaded".into() }),
            Ok(reply),
        ]);
        let policy = RetryPolicy::new(3, std::time::Duration::from_millis(1));

        let candidates = generate_candidates(&request(2), &llm, &policy).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].index, 1);
        assert!(candidates.iter().all(|c| c.attempt == 2));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_the_batch() {
        let llm = ScriptedGenerator::repeating(Err(ServiceError::Transport("reset".into())));
        let err = generate_candidates(&request(3), &llm, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Service(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn test_blank_reply_fabricates_nothing() {
        let llm = ScriptedGenerator::new(vec![Ok("  \n---VERSION---\n ".to_string())]);
        let err = generate_candidates(&request(2), &llm, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }
}
