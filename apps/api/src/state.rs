use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::generation::orchestrator::PosterPipeline;
use crate::storage::ArtifactStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Run-stage tracking reads; writes go through the pipeline's observer.
    pub redis: RedisClient,
    pub config: Config,
    /// Pipeline with its upstream capabilities (LLM, image search, renderer, observer).
    pub pipeline: PosterPipeline,
    pub store: Arc<dyn ArtifactStore>,
    /// Reference templates loaded once at startup, in file-name order.
    pub templates: Arc<Vec<String>>,
}
