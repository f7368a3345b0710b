use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::evaluator::JudgeOutcome;
use crate::generation::generator::DEFAULT_DOCUMENT_TYPE;
use crate::generation::images::{ImageAsset, ImageMode};
use crate::generation::keywords::{extract_keywords, KeywordSet};
use crate::generation::orchestrator::{DroppedCandidate, PosterJob};
use crate::models::club::ClubProfile;
use crate::models::poster::{PosterArtifactRow, PosterRunRow};
use crate::state::AppState;
use crate::storage::{self, RunLedger};
use crate::tracking;

/// Upper bound on candidates per run; one call must carry them all.
pub const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageModeParam {
    #[default]
    FirstMatch,
    Collect,
}

impl ImageModeParam {
    fn into_mode(self, collect_limit: u32) -> ImageMode {
        match self {
            ImageModeParam::FirstMatch => ImageMode::FirstMatch,
            ImageModeParam::Collect => ImageMode::Collect {
                limit: collect_limit,
            },
        }
    }
}

/// A profile either as raw `key: value` text or as a JSON object.
#[derive(Debug, Deserialize)]
pub struct ProfileInput {
    pub profile_text: Option<String>,
    pub profile: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePosterRequest {
    #[serde(flatten)]
    pub input: ProfileInput,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    pub candidate_count: Option<usize>,
    #[serde(default)]
    pub image_mode: ImageModeParam,
}

fn default_document_type() -> String {
    DEFAULT_DOCUMENT_TYPE.to_string()
}

#[derive(Debug, Serialize)]
pub struct RankedEntryResponse {
    pub label: String,
    pub position: usize,
    pub candidate_index: usize,
    pub attempt: u32,
    pub truncated: bool,
    pub artifact_id: Uuid,
    pub markup_id: Uuid,
    pub byte_size: usize,
}

#[derive(Debug, Serialize)]
pub struct PosterRunResponse {
    pub run_id: Uuid,
    pub keywords: KeywordSet,
    pub images: Vec<ImageAsset>,
    pub entries: Vec<RankedEntryResponse>,
    pub ranking_text: String,
    pub judge: JudgeOutcome,
    pub dropped: Vec<DroppedCandidate>,
}

#[derive(Debug, Serialize)]
pub struct PosterRunDetail {
    pub run: PosterRunRow,
    pub artifacts: Vec<PosterArtifactRow>,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: Uuid,
    pub stage: String,
}

fn resolve_profile(input: ProfileInput) -> Result<ClubProfile, AppError> {
    let profile = match (input.profile, input.profile_text) {
        (Some(fields), _) => ClubProfile::from(fields),
        (None, Some(text)) => ClubProfile::parse(&text),
        (None, None) => {
            return Err(AppError::Validation(
                "either 'profile' or 'profile_text' is required".to_string(),
            ))
        }
    };
    profile.validate()?;
    Ok(profile)
}

fn resolve_candidate_count(requested: Option<usize>, default: usize) -> Result<usize, AppError> {
    match requested.unwrap_or(default) {
        0 => Err(AppError::Validation("candidate_count must be at least 1".to_string())),
        n if n > MAX_CANDIDATES => Err(AppError::Validation(format!(
            "candidate_count must be at most {MAX_CANDIDATES}"
        ))),
        n => Ok(n),
    }
}

/// POST /api/v1/posters
/// Runs the full pipeline, stores the ranked artifacts and returns the ranking.
pub async fn handle_create_poster(
    State(state): State<AppState>,
    Json(req): Json<CreatePosterRequest>,
) -> Result<Json<PosterRunResponse>, AppError> {
    let profile = resolve_profile(req.input)?;
    let candidate_count = resolve_candidate_count(req.candidate_count, state.config.candidate_count)?;
    let club_name = profile.name().unwrap_or_default().to_string();

    let run_id = Uuid::new_v4();
    storage::create_run(&state.db, run_id, &club_name, &req.document_type).await?;
    info!(%run_id, club = %club_name, candidate_count, "Poster run started");

    let job = PosterJob {
        profile,
        document_type: req.document_type,
        templates: state.templates.as_ref().clone(),
        candidate_count,
        image_mode: req.image_mode.into_mode(state.config.images_per_keyword),
    };

    let cancel = CancellationToken::new();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = Duration::from_secs(state.config.run_timeout_secs);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(%run_id, "Run deadline reached, cancelling");
            cancel.cancel();
        })
    };
    let result = state.pipeline.run(run_id, job, &cancel).await;
    deadline.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            state.db.fail_run(run_id, e.stage.as_str()).await?;
            return Err(e.into());
        }
    };

    let stored = match storage::persist_outcome(state.store.as_ref(), &state.db, &outcome).await {
        Ok(stored) => stored,
        Err(e) => {
            let failed = format!("failed:{}", storage::STAGE_STORED);
            if let Err(redis_err) = tracking::write_stage(&state.redis, run_id, &failed).await {
                warn!(%run_id, "Failed to publish run stage: {redis_err}");
            }
            return Err(e);
        }
    };

    let entries = outcome
        .evaluation
        .entries
        .iter()
        .zip(stored)
        .map(|(entry, ids)| RankedEntryResponse {
            label: entry.label.clone(),
            position: entry.position,
            candidate_index: entry.artifact.candidate.index,
            attempt: entry.artifact.candidate.provenance.attempt,
            truncated: entry.artifact.candidate.provenance.truncated,
            artifact_id: ids.pdf_id,
            markup_id: ids.markup_id,
            byte_size: entry.artifact.bytes.len(),
        })
        .collect();

    info!(%run_id, "Poster run complete");
    Ok(Json(PosterRunResponse {
        run_id,
        keywords: outcome.keywords,
        images: outcome.images,
        entries,
        ranking_text: outcome.evaluation.rationale,
        judge: outcome.evaluation.outcome,
        dropped: outcome.dropped,
    }))
}

/// POST /api/v1/posters/keywords
/// Previews keyword extraction for a profile.
pub async fn handle_preview_keywords(
    State(state): State<AppState>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<KeywordSet>, AppError> {
    let profile = resolve_profile(input)?;
    let keywords = extract_keywords(&profile, state.pipeline.services().llm.as_ref()).await;
    Ok(Json(keywords))
}

/// GET /api/v1/posters/:id
pub async fn handle_get_poster(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PosterRunDetail>, AppError> {
    let run = storage::get_run(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Poster run {id} not found")))?;
    let artifacts = storage::list_artifacts(&state.db, id).await?;
    Ok(Json(PosterRunDetail { run, artifacts }))
}

/// GET /api/v1/posters/:id/status
pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunStatusResponse>, AppError> {
    let stage = tracking::read_stage(&state.redis, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No status for poster run {id}")))?;
    Ok(Json(RunStatusResponse { run_id: id, stage }))
}
