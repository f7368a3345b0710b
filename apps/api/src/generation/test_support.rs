//! In-process stand-ins for the upstream services, for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::generation::evaluator::RenderedArtifact;
use crate::generation::markup::{Candidate, Provenance};
use crate::generation::orchestrator::RunState;
use crate::image_search::ImageSearch;
use crate::layout::default_page_spec;
use crate::llm_client::{CompletionRequest, TextGenerator, MODEL};
use crate::models::club::ClubProfile;
use crate::render::text::{TextExtractionError, TextExtractor};
use crate::render::{RenderError, RenderJob, Renderer};
use crate::tracking::StageObserver;

/// Markup containing this text fails to render.
pub const RENDER_FAIL_MARKER: &str = "render-fails-here";
/// Markup containing this text panics the render task.
pub const RENDER_PANIC_MARKER: &str = "render-panics-here";

pub fn chess_club() -> ClubProfile {
    ClubProfile::parse(
        "name: Chess Club\nmission: Teach strategy\npurpose: Weekly matches\naudience: Students",
    )
}

/// A complete document whose visible text is `text`.
pub fn poster(text: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><style>h1 {{ color: navy; }}</style></head>\
         <body><h1>{text}</h1></body></html>"
    )
}

/// A rendered artifact whose bytes are `text`, from candidate `index`.
pub fn rendered(index: usize, text: &str) -> RenderedArtifact {
    RenderedArtifact {
        candidate: Candidate {
            index,
            markup: poster(text),
            provenance: Provenance {
                attempt: 1,
                generation_model: MODEL.to_string(),
                truncated: false,
                judged_by: None,
            },
        },
        bytes: Bytes::from(text.to_string()),
        page: default_page_spec(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generative text
// ────────────────────────────────────────────────────────────────────────────

/// Replies from a script, in order. Records every request.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, ServiceError>>>,
    repeat: Option<Result<String, ServiceError>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Gives the same reply to every call.
    pub fn repeating(reply: Result<String, ServiceError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.repeat {
            Some(reply) => reply.clone(),
            None => Err(ServiceError::Malformed("script exhausted".into())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Image search
// ────────────────────────────────────────────────────────────────────────────

/// Per-query canned results; unknown queries find nothing.
#[derive(Default)]
pub struct StubImageSearch {
    results: HashMap<String, Result<Vec<String>, ServiceError>>,
    queries: Mutex<Vec<(String, u32)>>,
}

impl StubImageSearch {
    pub fn with(mut self, query: &str, result: Result<Vec<String>, ServiceError>) -> Self {
        self.results.insert(query.to_string(), result);
        self
    }

    pub fn queries(&self) -> Vec<(String, u32)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSearch for StubImageSearch {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<String>, ServiceError> {
        self.queries.lock().unwrap().push((query.to_string(), count));
        match self.results.get(query) {
            Some(Ok(uris)) => Ok(uris.iter().take(count as usize).cloned().collect()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(Vec::new()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rendering and text extraction
// ────────────────────────────────────────────────────────────────────────────

/// "Renders" markup to its own bytes, optionally after a delay.
#[derive(Default)]
pub struct StubRenderer {
    delay: Option<Duration>,
    jobs: Mutex<Vec<RenderJob>>,
}

impl StubRenderer {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn jobs(&self) -> Vec<RenderJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, job: &RenderJob) -> Result<Bytes, RenderError> {
        self.jobs.lock().unwrap().push(job.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if job.markup.contains(RENDER_PANIC_MARKER) {
            panic!("renderer crashed");
        }
        if job.markup.contains(RENDER_FAIL_MARKER) {
            return Err(RenderError::ResourceFetch("https://img/missing.jpg".into()));
        }
        Ok(Bytes::from(job.markup.clone()))
    }
}

pub struct StubExtractor {
    fail: bool,
}

impl StubExtractor {
    /// Returns the artifact bytes as text.
    pub fn working() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract_text(&self, artifact: Bytes) -> Result<String, TextExtractionError> {
        if self.fail {
            return Err(TextExtractionError::Pdf("not a PDF".into()));
        }
        Ok(String::from_utf8_lossy(&artifact).into_owned())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(Uuid, RunState)>>,
}

impl RecordingObserver {
    pub fn states(&self, run_id: Uuid) -> Vec<RunState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, state)| *state)
            .collect()
    }
}

#[async_trait]
impl StageObserver for RecordingObserver {
    async fn observe(&self, run_id: Uuid, state: RunState) {
        self.events.lock().unwrap().push((run_id, state));
    }
}
