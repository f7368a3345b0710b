//! Evaluator: ranks rendered candidates with the generative service as judge.
//!
//! The ranking order exposed to the rest of the system is the candidate index
//! order. The judge's reply is kept verbatim as the rationale and is never
//! parsed for structure.

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::generation::markup::Candidate;
use crate::generation::prompts::{JUDGE_MAX_TOKENS, JUDGE_PROMPT_TEMPLATE, JUDGE_SYSTEM};
use crate::layout::PageSpec;
use crate::llm_client::{ChatMessage, CompletionRequest, TextGenerator};
use crate::render::text::{visible_text, TextExtractor};

/// Output of rendering one candidate.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub candidate: Candidate,
    pub bytes: Bytes,
    pub page: PageSpec,
}

#[derive(Debug, Clone)]
pub struct RankedEntry {
    /// 1-based.
    pub position: usize,
    pub label: String,
    pub artifact: RenderedArtifact,
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub entries: Vec<RankedEntry>,
    /// Judge's free-text justification, shared by all entries.
    pub rationale: String,
    pub outcome: JudgeOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JudgeOutcome {
    Judged { model: String },
    /// One survivor; nothing to compare.
    Uncontested,
    /// The judge call failed; rationale explains.
    Unavailable,
}

pub fn judge_request(labelled_texts: &[(String, String)]) -> CompletionRequest {
    let candidates = labelled_texts
        .iter()
        .map(|(label, text)| format!("{label}:\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = JUDGE_PROMPT_TEMPLATE
        .replace("{count}", &labelled_texts.len().to_string())
        .replace("{candidates}", &candidates);
    CompletionRequest::new(
        vec![ChatMessage::system(JUDGE_SYSTEM), ChatMessage::user(prompt)],
        JUDGE_MAX_TOKENS,
    )
}

/// Text the judge sees for one artifact: the PDF text layer, or the markup's
/// visible text when the artifact cannot be read back.
async fn artifact_text(artifact: &RenderedArtifact, extractor: &dyn TextExtractor) -> String {
    match extractor.extract_text(artifact.bytes.clone()).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => visible_text(&artifact.candidate.markup),
        Err(e) => {
            warn!(
                label = %artifact.candidate.label(),
                "Artifact text extraction failed, using markup text: {e}"
            );
            visible_text(&artifact.candidate.markup)
        }
    }
}

pub async fn evaluate(
    mut artifacts: Vec<RenderedArtifact>,
    llm: &dyn TextGenerator,
    extractor: &dyn TextExtractor,
) -> EvaluationResult {
    artifacts.sort_by_key(|a| a.candidate.index);

    let (rationale, outcome) = match artifacts.len() {
        0 => ("No candidates were rendered.".to_string(), JudgeOutcome::Uncontested),
        1 => (
            format!(
                "{} was the only candidate to render, so it ranks first by default.",
                artifacts[0].candidate.label()
            ),
            JudgeOutcome::Uncontested,
        ),
        _ => judge(&artifacts, llm, extractor).await,
    };

    let judged_by = match &outcome {
        JudgeOutcome::Judged { model } => Some(model.clone()),
        _ => None,
    };

    let entries = artifacts
        .into_iter()
        .enumerate()
        .map(|(i, mut artifact)| {
            artifact.candidate.provenance.judged_by = judged_by.clone();
            RankedEntry {
                position: i + 1,
                label: artifact.candidate.label(),
                artifact,
            }
        })
        .collect();

    EvaluationResult {
        entries,
        rationale,
        outcome,
    }
}

async fn judge(
    artifacts: &[RenderedArtifact],
    llm: &dyn TextGenerator,
    extractor: &dyn TextExtractor,
) -> (String, JudgeOutcome) {
    let texts = join_all(artifacts.iter().map(|a| artifact_text(a, extractor))).await;
    let labelled: Vec<(String, String)> = artifacts
        .iter()
        .map(|a| a.candidate.label())
        .zip(texts)
        .collect();

    let request = judge_request(&labelled);
    match llm.complete(&request).await {
        Ok(reply) if !reply.trim().is_empty() => {
            info!("Judge ranked {} candidates", artifacts.len());
            (reply, JudgeOutcome::Judged { model: request.model.clone() })
        }
        Ok(_) => {
            warn!("Judge returned an empty ranking");
            (unavailable_rationale(&labelled), JudgeOutcome::Unavailable)
        }
        Err(e) => {
            warn!("Judge call failed, keeping generation order: {e}");
            (unavailable_rationale(&labelled), JudgeOutcome::Unavailable)
        }
    }
}

fn unavailable_rationale(labelled: &[(String, String)]) -> String {
    let labels = labelled
        .iter()
        .map(|(label, _)| label.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("The judge was unavailable; candidates are listed in generation order: {labels}.")
}
