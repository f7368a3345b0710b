mod config;
mod db;
mod errors;
mod generation;
mod image_search;
mod layout;
mod llm_client;
mod models;
mod render;
mod routes;
mod state;
mod storage;
mod templates;
mod tracking;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::connect_and_migrate;
use crate::generation::orchestrator::{PipelineServices, PipelineSettings, PosterPipeline};
use crate::generation::retry::RetryPolicy;
use crate::image_search::UnsplashClient;
use crate::layout::default_page_spec;
use crate::llm_client::LlmClient;
use crate::render::{PdfTextExtractor, WeasyPrintRenderer};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::PgS3ArtifactStore;
use crate::tracking::RedisStageObserver;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Placard API v{}", env!("CARGO_PKG_VERSION"));

    let db = connect_and_migrate(&config.database_url).await?;

    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let extractor = Arc::new(PdfTextExtractor);
    let templates = match &config.template_dir {
        Some(dir) => templates::load_templates(dir, extractor.as_ref()).await?,
        None => Vec::new(),
    };

    let page = default_page_spec();
    info!(
        "Page: {}x{}in, margin {}in; renderer: {}",
        page.width_in,
        page.height_in,
        page.margin_in,
        config.weasyprint_bin.display()
    );

    let pipeline = PosterPipeline::new(
        PipelineServices {
            llm: Arc::new(llm),
            image_search: Arc::new(UnsplashClient::new(config.unsplash_access_key.clone())),
            renderer: Arc::new(WeasyPrintRenderer::new(config.weasyprint_bin.clone())),
            extractor,
            observer: Arc::new(RedisStageObserver::new(redis.clone())),
        },
        PipelineSettings {
            retry: RetryPolicy::default(),
            page,
        },
    );

    let store = Arc::new(PgS3ArtifactStore::new(
        db.clone(),
        s3,
        config.s3_bucket.clone(),
    ));

    let state = AppState {
        db,
        redis,
        config: config.clone(),
        pipeline,
        store,
        templates: Arc::new(templates),
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict CORS origins once the web client domain is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "placard-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
