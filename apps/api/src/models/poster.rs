use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PosterRunRow {
    pub id: Uuid,
    pub club_name: String,
    pub document_type: String,
    pub status: String,
    pub failed_stage: Option<String>,
    pub ranking_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PosterArtifactRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub label: String,
    pub kind: String,
    pub s3_key: Option<String>,
    pub content: Option<String>,
    /// Position in the ranking, 1-based.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}
