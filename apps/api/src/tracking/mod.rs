//! Run tracking: publishes orchestrator transitions for status polling.

use async_trait::async_trait;
use redis::Client as RedisClient;
use tracing::warn;
use uuid::Uuid;

use crate::generation::orchestrator::RunState;

/// Stage keys expire a day after the last transition.
const STAGE_TTL_SECS: u64 = 24 * 60 * 60;

/// Receives every transition of a run, including the terminal failure.
/// Observation is best-effort: implementations log their own errors.
#[async_trait]
pub trait StageObserver: Send + Sync {
    async fn observe(&self, run_id: Uuid, state: RunState);
}

pub fn stage_key(run_id: Uuid) -> String {
    format!("placard:run:{run_id}:stage")
}

/// Stores the latest state of each run under `placard:run:<id>:stage`.
#[derive(Clone)]
pub struct RedisStageObserver {
    client: RedisClient,
}

impl RedisStageObserver {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageObserver for RedisStageObserver {
    async fn observe(&self, run_id: Uuid, state: RunState) {
        if let Err(e) = write_stage(&self.client, run_id, &state.to_string()).await {
            warn!(%run_id, %state, "Failed to publish run stage: {e}");
        }
    }
}

/// Overwrites the published state of a run.
pub async fn write_stage(client: &RedisClient, run_id: Uuid, stage: &str) -> redis::RedisResult<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("SET")
        .arg(stage_key(run_id))
        .arg(stage)
        .arg("EX")
        .arg(STAGE_TTL_SECS)
        .query_async::<_, ()>(&mut conn)
        .await
}

/// Reads the last published state of a run; `None` if unknown or expired.
pub async fn read_stage(client: &RedisClient, run_id: Uuid) -> redis::RedisResult<Option<String>> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("GET")
        .arg(stage_key(run_id))
        .query_async::<_, Option<String>>(&mut conn)
        .await
}
