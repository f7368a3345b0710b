//! Orchestrator: runs one poster request through the pipeline state machine.
//!
//! Loaded → KeywordsExtracted → ImagesSourced → CandidatesGenerated →
//! CandidatesExtracted → CandidatesRendered → Evaluated → Done
//!
//! Stages are strictly sequential over the whole batch. Extraction and render
//! failures drop single candidates; the run fails only on invalid input,
//! generation failure, zero survivors, or cancellation. A failure names the
//! stage the run could not reach.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::generation::evaluator::{evaluate, EvaluationResult, RenderedArtifact};
use crate::generation::generator::{generate_candidates, GenerationError, GenerationRequest};
use crate::generation::images::{source_images, ImageAsset, ImageMode};
use crate::generation::keywords::{extract_keywords, KeywordSet};
use crate::generation::markup::{candidate_label, extract_candidate, Candidate};
use crate::generation::retry::RetryPolicy;
use crate::image_search::ImageSearch;
use crate::layout::{declare_page, PageSpec, BASE_STYLESHEET};
use crate::llm_client::TextGenerator;
use crate::models::club::ClubProfile;
use crate::render::{RenderJob, Renderer, TextExtractor};
use crate::tracking::StageObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Loaded,
    KeywordsExtracted,
    ImagesSourced,
    CandidatesGenerated,
    CandidatesExtracted,
    CandidatesRendered,
    Evaluated,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Loaded => "loaded",
            PipelineStage::KeywordsExtracted => "keywords_extracted",
            PipelineStage::ImagesSourced => "images_sourced",
            PipelineStage::CandidatesGenerated => "candidates_generated",
            PipelineStage::CandidatesExtracted => "candidates_extracted",
            PipelineStage::CandidatesRendered => "candidates_rendered",
            PipelineStage::Evaluated => "evaluated",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What observers see: a reached stage or the terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Reached(PipelineStage),
    Failed(PipelineStage),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Reached(stage) => write!(f, "{stage}"),
            RunState::Failed(stage) => write!(f, "failed:{stage}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FailureReason {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("no candidates survived ({dropped} dropped)")]
    NoSurvivors { dropped: usize },

    #[error("run was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
#[error("pipeline failed at {stage}: {reason}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub reason: FailureReason,
}

impl PipelineError {
    fn new(stage: PipelineStage, reason: impl Into<FailureReason>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// A candidate removed from the batch, and why.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedCandidate {
    pub label: String,
    pub stage: PipelineStage,
    pub error: String,
}

/// Upstream capabilities the pipeline is built from.
#[derive(Clone)]
pub struct PipelineServices {
    pub llm: Arc<dyn TextGenerator>,
    pub image_search: Arc<dyn ImageSearch>,
    pub renderer: Arc<dyn Renderer>,
    pub extractor: Arc<dyn TextExtractor>,
    pub observer: Arc<dyn StageObserver>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub page: PageSpec,
}

/// One request for a poster run.
#[derive(Debug, Clone)]
pub struct PosterJob {
    pub profile: ClubProfile,
    pub document_type: String,
    pub templates: Vec<String>,
    pub candidate_count: usize,
    pub image_mode: ImageMode,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub keywords: KeywordSet,
    pub images: Vec<ImageAsset>,
    pub evaluation: EvaluationResult,
    pub dropped: Vec<DroppedCandidate>,
}

#[derive(Clone)]
pub struct PosterPipeline {
    services: PipelineServices,
    settings: PipelineSettings,
}

impl PosterPipeline {
    pub fn new(services: PipelineServices, settings: PipelineSettings) -> Self {
        Self { services, settings }
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    /// Runs the whole pipeline. Cancelling `cancel` abandons in-flight work and
    /// fails the run at the stage in progress.
    pub async fn run(
        &self,
        run_id: Uuid,
        job: PosterJob,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        match self.run_stages(run_id, job, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(%run_id, "Run failed: {e}");
                self.services
                    .observer
                    .observe(run_id, RunState::Failed(e.stage))
                    .await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        job: PosterJob,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let services = &self.services;
        let retry = &self.settings.retry;
        let mut dropped = Vec::new();

        let request = GenerationRequest::new(job.profile, job.document_type, job.candidate_count)
            .map_err(|e| PipelineError::new(PipelineStage::Loaded, e))?
            .with_templates(job.templates);
        info!(
            %run_id,
            document_type = request.document_type(),
            candidates = request.candidate_count(),
            "Run loaded"
        );
        self.reach(run_id, PipelineStage::Loaded).await;

        let keywords = guard(
            cancel,
            PipelineStage::KeywordsExtracted,
            extract_keywords(request.profile(), services.llm.as_ref()),
        )
        .await?;
        self.reach(run_id, PipelineStage::KeywordsExtracted).await;

        let images = guard(
            cancel,
            PipelineStage::ImagesSourced,
            source_images(&keywords, job.image_mode, services.image_search.as_ref(), retry),
        )
        .await?;
        self.reach(run_id, PipelineStage::ImagesSourced).await;

        let request = request.with_images(images.clone());
        info!(%run_id, images = request.images().len(), "Generating candidates");
        let raw = guard(
            cancel,
            PipelineStage::CandidatesGenerated,
            generate_candidates(&request, services.llm.as_ref(), retry),
        )
        .await?
        .map_err(|e| PipelineError::new(PipelineStage::CandidatesGenerated, e))?;
        self.reach(run_id, PipelineStage::CandidatesGenerated).await;

        if cancel.is_cancelled() {
            return Err(PipelineError::new(PipelineStage::CandidatesExtracted, FailureReason::Cancelled));
        }
        let mut candidates = Vec::with_capacity(raw.len());
        for segment in raw {
            let label = candidate_label(segment.index);
            match extract_candidate(segment) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    warn!(%run_id, %label, "Dropping candidate: {e}");
                    dropped.push(DroppedCandidate {
                        label,
                        stage: PipelineStage::CandidatesExtracted,
                        error: e.to_string(),
                    });
                }
            }
        }
        if candidates.is_empty() {
            return Err(PipelineError::new(
                PipelineStage::CandidatesExtracted,
                FailureReason::NoSurvivors { dropped: dropped.len() },
            ));
        }
        self.reach(run_id, PipelineStage::CandidatesExtracted).await;

        let artifacts = self.render_all(run_id, candidates, &mut dropped, cancel).await?;
        if artifacts.is_empty() {
            return Err(PipelineError::new(
                PipelineStage::CandidatesRendered,
                FailureReason::NoSurvivors { dropped: dropped.len() },
            ));
        }
        self.reach(run_id, PipelineStage::CandidatesRendered).await;

        let evaluation = guard(
            cancel,
            PipelineStage::Evaluated,
            evaluate(artifacts, services.llm.as_ref(), services.extractor.as_ref()),
        )
        .await?;
        self.reach(run_id, PipelineStage::Evaluated).await;

        self.reach(run_id, PipelineStage::Done).await;
        Ok(PipelineOutcome {
            run_id,
            keywords,
            images,
            evaluation,
            dropped,
        })
    }

    /// Renders every candidate concurrently; failures drop the candidate.
    /// Returned artifacts are in candidate index order.
    async fn render_all(
        &self,
        run_id: Uuid,
        candidates: Vec<Candidate>,
        dropped: &mut Vec<DroppedCandidate>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RenderedArtifact>, PipelineError> {
        let page = &self.settings.page;
        let stylesheets = vec![BASE_STYLESHEET.to_string(), page.page_stylesheet()];

        let mut tasks = JoinSet::new();
        // Labels survive a panicking task; its candidate does not.
        let mut labels = HashMap::new();
        for candidate in candidates {
            let renderer = Arc::clone(&self.services.renderer);
            let job = RenderJob {
                markup: declare_page(&candidate.markup, page),
                stylesheets: stylesheets.clone(),
                page: page.clone(),
            };
            let label = candidate.label();
            let handle = tasks.spawn(async move {
                let result = renderer.render(&job).await;
                (candidate, job.page, result)
            });
            labels.insert(handle.id(), label);
        }

        let mut artifacts = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(PipelineError::new(
                        PipelineStage::CandidatesRendered,
                        FailureReason::Cancelled,
                    ));
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok((candidate, page, Ok(bytes)))) => {
                        info!(%run_id, label = %candidate.label(), size = bytes.len(), "Rendered candidate");
                        artifacts.push(RenderedArtifact { candidate, bytes, page });
                    }
                    Some(Ok((candidate, _, Err(e)))) => {
                        warn!(%run_id, label = %candidate.label(), "Dropping candidate: {e}");
                        dropped.push(DroppedCandidate {
                            label: candidate.label(),
                            stage: PipelineStage::CandidatesRendered,
                            error: e.to_string(),
                        });
                    }
                    Some(Err(e)) => {
                        let label = labels.remove(&e.id()).unwrap_or_default();
                        warn!(%run_id, %label, "Render task failed: {e}");
                        dropped.push(DroppedCandidate {
                            label,
                            stage: PipelineStage::CandidatesRendered,
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        artifacts.sort_by_key(|a| a.candidate.index);
        Ok(artifacts)
    }

    async fn reach(&self, run_id: Uuid, stage: PipelineStage) {
        info!(%run_id, %stage, "Stage reached");
        self.services
            .observer
            .observe(run_id, RunState::Reached(stage))
            .await;
    }
}

/// Races one stage against cancellation.
async fn guard<T>(
    cancel: &CancellationToken,
    stage: PipelineStage,
    work: impl Future<Output = T>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::new(stage, FailureReason::Cancelled)),
        out = work => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::errors::ServiceError;
    use crate::generation::evaluator::JudgeOutcome;
    use crate::generation::prompts::VERSION_DELIMITER;
    use crate::generation::test_support::{
        chess_club, poster, RecordingObserver, ScriptedGenerator, StubExtractor, StubImageSearch,
        StubRenderer, RENDER_FAIL_MARKER, RENDER_PANIC_MARKER,
    };
    use crate::layout::default_page_spec;

    struct Harness {
        llm: Arc<ScriptedGenerator>,
        images: Arc<StubImageSearch>,
        renderer: Arc<StubRenderer>,
        observer: Arc<RecordingObserver>,
    }

    impl Harness {
        fn new(llm: ScriptedGenerator, images: StubImageSearch, renderer: StubRenderer) -> Self {
            Self {
                llm: Arc::new(llm),
                images: Arc::new(images),
                renderer: Arc::new(renderer),
                observer: Arc::new(RecordingObserver::default()),
            }
        }

        fn pipeline(&self) -> PosterPipeline {
            PosterPipeline::new(
                PipelineServices {
                    llm: self.llm.clone(),
                    image_search: self.images.clone(),
                    renderer: self.renderer.clone(),
                    extractor: Arc::new(StubExtractor::working()),
                    observer: self.observer.clone(),
                },
                PipelineSettings {
                    retry: RetryPolicy::default(),
                    page: default_page_spec(),
                },
            )
        }
    }

    fn job(count: usize) -> PosterJob {
        PosterJob {
            profile: chess_club(),
            document_type: "poster".into(),
            templates: vec![],
            candidate_count: count,
            image_mode: ImageMode::FirstMatch,
        }
    }

    fn batch(docs: &[String]) -> String {
        docs.join(&format!("\n{VERSION_DELIMITER}\n"))
    }

    const ALL_STAGES: [PipelineStage; 8] = [
        PipelineStage::Loaded,
        PipelineStage::KeywordsExtracted,
        PipelineStage::ImagesSourced,
        PipelineStage::CandidatesGenerated,
        PipelineStage::CandidatesExtracted,
        PipelineStage::CandidatesRendered,
        PipelineStage::Evaluated,
        PipelineStage::Done,
    ];

    #[tokio::test]
    async fn test_chess_club_end_to_end() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess, strategy, students".into()),
                Ok(batch(&[poster("Bold"), poster("Minimal"), poster("Retro")])),
                Ok("Candidate 2 wins on clarity, Candidate 1 is bold, Candidate 3 is busy.".into()),
            ]),
            StubImageSearch::default().with("chess", Ok(vec!["https://img/chessboard".into()])),
            StubRenderer::default(),
        );
        let run_id = Uuid::new_v4();

        let outcome = harness
            .pipeline()
            .run(run_id, job(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.keywords.as_slice(), ["chess", "strategy", "students"]);
        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].uri, "https://img/chessboard");

        let evaluation = &outcome.evaluation;
        assert!((1..=3).contains(&evaluation.entries.len()));
        for entry in &evaluation.entries {
            assert!(evaluation.rationale.contains(&entry.label));
        }
        assert!(matches!(evaluation.outcome, JudgeOutcome::Judged { .. }));

        // The image reached the generation prompt.
        let requests = harness.llm.requests();
        assert!(requests[1].messages[1].content.contains("https://img/chessboard"));

        // Every render carried the page declaration and both stylesheets.
        let render_jobs = harness.renderer.jobs();
        assert_eq!(render_jobs.len(), 3);
        for render_job in render_jobs {
            assert!(render_job.markup.contains("@page { size: 8.5in 11in; margin: 0.4in; }"));
            assert_eq!(render_job.stylesheets.len(), 2);
        }

        let states = harness.observer.states(run_id);
        let expected: Vec<RunState> = ALL_STAGES.iter().copied().map(RunState::Reached).collect();
        assert_eq!(states, expected);
    }

    #[tokio::test]
    async fn test_panicking_render_task_is_recorded_as_dropped() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Ok(batch(&[
                    poster("One"),
                    poster(RENDER_PANIC_MARKER),
                    poster(RENDER_FAIL_MARKER),
                ])),
            ]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );

        let outcome = harness
            .pipeline()
            .run(Uuid::new_v4(), job(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.evaluation.entries.len(), 1);
        let mut dropped: Vec<&str> = outcome.dropped.iter().map(|d| d.label.as_str()).collect();
        dropped.sort();
        assert_eq!(dropped, ["Candidate 2", "Candidate 3"]);
        assert!(outcome
            .dropped
            .iter()
            .all(|d| d.stage == PipelineStage::CandidatesRendered));
    }

    #[tokio::test]
    async fn test_one_render_failure_leaves_two_for_evaluation() {
        let failing = poster(RENDER_FAIL_MARKER);
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Ok(batch(&[poster("One"), failing, poster("Three")])),
                Ok("Candidate 3 then Candidate 1".into()),
            ]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );
        let run_id = Uuid::new_v4();

        let outcome = harness
            .pipeline()
            .run(run_id, job(3), &CancellationToken::new())
            .await
            .unwrap();

        let labels: Vec<&str> = outcome
            .evaluation
            .entries
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, ["Candidate 1", "Candidate 3"]);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].label, "Candidate 2");
        assert_eq!(outcome.dropped[0].stage, PipelineStage::CandidatesRendered);

        // The judge saw exactly the two survivors.
        let requests = harness.llm.requests();
        let judge_prompt = &requests[2].messages[1].content;
        assert!(judge_prompt.contains("from 2 posters"));
        assert!(!judge_prompt.contains("Candidate 2:"));

        assert_eq!(
            harness.observer.states(run_id).last(),
            Some(&RunState::Reached(PipelineStage::Done))
        );
    }

    #[tokio::test]
    async fn test_prose_candidates_are_dropped_at_extraction() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Ok(batch(&["Sorry, here are some ideas instead.".to_string(), poster("Kept")])),
            ]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );

        let outcome = harness
            .pipeline()
            .run(Uuid::new_v4(), job(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.evaluation.entries.len(), 1);
        assert_eq!(outcome.evaluation.entries[0].label, "Candidate 2");
        assert_eq!(outcome.evaluation.outcome, JudgeOutcome::Uncontested);
        assert_eq!(outcome.dropped[0].stage, PipelineStage::CandidatesExtracted);
        // Keywords and generation only; no judge call for a single survivor.
        assert_eq!(harness.llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_extracted_candidates_fail_the_run() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Ok("I cannot create HTML right now.".into()),
            ]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );
        let run_id = Uuid::new_v4();

        let err = harness
            .pipeline()
            .run(run_id, job(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::CandidatesExtracted);
        assert!(matches!(err.reason, FailureReason::NoSurvivors { dropped: 1 }));
        assert_eq!(
            harness.observer.states(run_id).last(),
            Some(&RunState::Failed(PipelineStage::CandidatesExtracted))
        );
        assert!(harness.renderer.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_zero_rendered_candidates_fail_the_run() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Ok(batch(&[poster(RENDER_FAIL_MARKER), poster(RENDER_FAIL_MARKER)])),
            ]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );

        let err = harness
            .pipeline()
            .run(Uuid::new_v4(), job(2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::CandidatesRendered);
        assert!(matches!(err.reason, FailureReason::NoSurvivors { dropped: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_retry_exhaustion_fails_the_run() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Err(ServiceError::RateLimited { status: 429 }),
                Err(ServiceError::RateLimited { status: 429 }),
                Err(ServiceError::RateLimited { status: 429 }),
            ]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );

        let err = harness
            .pipeline()
            .run(Uuid::new_v4(), job(3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::CandidatesGenerated);
        assert!(matches!(err.reason, FailureReason::Generation(GenerationError::Service(_))));
        assert_eq!(harness.llm.calls(), 4);
    }

    #[tokio::test]
    async fn test_missing_name_fails_before_any_call() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );
        let mut bad = job(3);
        bad.profile = ClubProfile::parse("mission: Teach strategy");

        let err = harness
            .pipeline()
            .run(Uuid::new_v4(), bad, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::Loaded);
        assert_eq!(harness.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![Ok("chess".into())]),
            StubImageSearch::default(),
            StubRenderer::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = harness
            .pipeline()
            .run(Uuid::new_v4(), job(3), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::KeywordsExtracted);
        assert!(matches!(err.reason, FailureReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_rendering_abandons_in_flight_work() {
        let harness = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("chess".into()),
                Ok(batch(&[poster("One"), poster("Two")])),
            ]),
            StubImageSearch::default(),
            StubRenderer::slow(Duration::from_secs(3600)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let run_id = Uuid::new_v4();

        let err = harness
            .pipeline()
            .run(run_id, job(2), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::CandidatesRendered);
        assert!(matches!(err.reason, FailureReason::Cancelled));
        assert_eq!(
            harness.observer.states(run_id).last(),
            Some(&RunState::Failed(PipelineStage::CandidatesRendered))
        );
    }
}
