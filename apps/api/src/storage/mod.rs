//! Artifact persistence: run rows in Postgres, rendered PDFs in S3.
//!
//! Every candidate writes to its own key, `posters/<run_id>/<label-slug>.pdf`,
//! so concurrent runs and candidates never share a destination.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::orchestrator::PipelineOutcome;
use crate::models::poster::{PosterArtifactRow, PosterRunRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Markup,
    Pdf,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Markup => "markup",
            ArtifactKind::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ArtifactBody {
    Text(String),
    Bytes(Bytes),
}

#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub run_id: Uuid,
    pub label: String,
    pub kind: ArtifactKind,
    /// 1-based ranking position.
    pub position: i32,
    pub body: ArtifactBody,
    pub created_at: DateTime<Utc>,
}

/// "Store artifact" capability: returns the stored record's id.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, artifact: NewArtifact) -> Result<Uuid, AppError>;
}

pub fn object_key(run_id: Uuid, label: &str) -> String {
    format!("posters/{run_id}/{}.pdf", slug(label))
}

fn slug(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Clone)]
pub struct PgS3ArtifactStore {
    db: PgPool,
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl PgS3ArtifactStore {
    pub fn new(db: PgPool, s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { db, s3, bucket }
    }
}

#[async_trait]
impl ArtifactStore for PgS3ArtifactStore {
    async fn store(&self, artifact: NewArtifact) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();

        let (s3_key, content) = match artifact.body {
            ArtifactBody::Bytes(bytes) => {
                let key = object_key(artifact.run_id, &artifact.label);
                self.s3
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .body(ByteStream::from(bytes))
                    .content_type("application/pdf")
                    .send()
                    .await
                    .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;
                info!("Uploaded artifact to s3://{}/{}", self.bucket, key);
                (Some(key), None)
            }
            ArtifactBody::Text(text) => (None, Some(text)),
        };

        sqlx::query(
            r#"
            INSERT INTO poster_artifacts
                (id, run_id, label, kind, s3_key, content, position, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(artifact.run_id)
        .bind(&artifact.label)
        .bind(artifact.kind.as_str())
        .bind(s3_key)
        .bind(content)
        .bind(artifact.position)
        .bind(artifact.created_at)
        .execute(&self.db)
        .await?;

        Ok(id)
    }
}

/// Stored ids for one ranked candidate.
#[derive(Debug, Clone, Copy)]
pub struct StoredCandidate {
    pub markup_id: Uuid,
    pub pdf_id: Uuid,
}

/// Stores markup and PDF for every ranked entry, in ranking order.
pub async fn store_outcome(
    store: &dyn ArtifactStore,
    outcome: &PipelineOutcome,
) -> Result<Vec<StoredCandidate>, AppError> {
    let now = Utc::now();
    let mut stored = Vec::with_capacity(outcome.evaluation.entries.len());
    for entry in &outcome.evaluation.entries {
        let artifact = |kind, body| NewArtifact {
            run_id: outcome.run_id,
            label: entry.label.clone(),
            kind,
            position: entry.position as i32,
            body,
            created_at: now,
        };
        let markup_id = store
            .store(artifact(
                ArtifactKind::Markup,
                ArtifactBody::Text(entry.artifact.candidate.markup.clone()),
            ))
            .await?;
        let pdf_id = store
            .store(artifact(
                ArtifactKind::Pdf,
                ArtifactBody::Bytes(entry.artifact.bytes.clone()),
            ))
            .await?;
        stored.push(StoredCandidate { markup_id, pdf_id });
    }
    Ok(stored)
}

/// `failed_stage` recorded when artifacts could not be stored.
pub const STAGE_STORED: &str = "stored";

/// Status updates for a run row.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn complete_run(&self, run_id: Uuid, ranking_text: &str) -> Result<(), AppError>;
    async fn fail_run(&self, run_id: Uuid, stage: &str) -> Result<(), AppError>;
    /// Removes artifact rows written before a storage failure.
    async fn discard_artifacts(&self, run_id: Uuid) -> Result<(), AppError>;
}

/// Stores every artifact and closes the run. A storage failure marks the run
/// failed at [`STAGE_STORED`] and discards the partial artifact rows before
/// the original error is returned.
pub async fn persist_outcome(
    store: &dyn ArtifactStore,
    ledger: &dyn RunLedger,
    outcome: &PipelineOutcome,
) -> Result<Vec<StoredCandidate>, AppError> {
    let run_id = outcome.run_id;
    let result = match store_outcome(store, outcome).await {
        Ok(stored) => ledger
            .complete_run(run_id, &outcome.evaluation.rationale)
            .await
            .map(|_| stored),
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        warn!(%run_id, "Storing run outcome failed: {e}");
        if let Err(discard) = ledger.discard_artifacts(run_id).await {
            warn!(%run_id, "Could not discard partial artifacts: {discard}");
        }
        if let Err(mark) = ledger.fail_run(run_id, STAGE_STORED).await {
            warn!(%run_id, "Could not mark run failed: {mark}");
        }
    }
    result
}

// ────────────────────────────────────────────────────────────────────────────
// Run rows
// ────────────────────────────────────────────────────────────────────────────

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_DONE: &str = "done";
pub const STATUS_FAILED: &str = "failed";

pub async fn create_run(
    pool: &PgPool,
    run_id: Uuid,
    club_name: &str,
    document_type: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO poster_runs (id, club_name, document_type, status)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(run_id)
    .bind(club_name)
    .bind(document_type)
    .bind(STATUS_RUNNING)
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl RunLedger for PgPool {
    async fn complete_run(&self, run_id: Uuid, ranking_text: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE poster_runs SET status = $2, ranking_text = $3 WHERE id = $1")
            .bind(run_id)
            .bind(STATUS_DONE)
            .bind(ranking_text)
            .execute(self)
            .await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, stage: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE poster_runs SET status = $2, failed_stage = $3 WHERE id = $1")
            .bind(run_id)
            .bind(STATUS_FAILED)
            .bind(stage)
            .execute(self)
            .await?;
        Ok(())
    }

    async fn discard_artifacts(&self, run_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM poster_artifacts WHERE run_id = $1")
            .bind(run_id)
            .execute(self)
            .await?;
        Ok(())
    }
}

pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<Option<PosterRunRow>, sqlx::Error> {
    sqlx::query_as::<_, PosterRunRow>(
        r#"
        SELECT id, club_name, document_type, status, failed_stage, ranking_text, created_at
        FROM poster_runs
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_artifacts(
    pool: &PgPool,
    run_id: Uuid,
) -> Result<Vec<PosterArtifactRow>, sqlx::Error> {
    sqlx::query_as::<_, PosterArtifactRow>(
        r#"
        SELECT id, run_id, label, kind, s3_key, content, position, created_at
        FROM poster_artifacts
        WHERE run_id = $1
        ORDER BY position ASC, kind ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
}
