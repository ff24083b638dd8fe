//! Redis-backed draft queue and its background worker.
//!
//! Handlers `LPUSH` a job id; the worker `BRPOP`s and runs the pipeline. The
//! queue only carries ids: the job row's `drafting` status is the source of
//! truth, so a duplicate or stale entry is skipped by the pipeline.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::drafting::pipeline::run_draft_pipeline;
use crate::errors::AppError;
use crate::jobs::service::drafting_job_ids;
use crate::state::AppState;

pub const QUEUE_KEY: &str = "drafts:queue";
/// Seconds BRPOP blocks before the worker loops.
const POLL_TIMEOUT_SECS: u64 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct DraftQueue {
    client: redis::Client,
}

impl DraftQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub async fn enqueue(&self, job_id: Uuid) -> Result<(), AppError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        let _: i64 = conn
            .lpush(QUEUE_KEY, job_id.to_string())
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        info!("Queued draft for job {job_id}");
        Ok(())
    }

    /// Blocks up to `POLL_TIMEOUT_SECS` for the next job id.
    async fn next(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<Option<Uuid>, redis::RedisError> {
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(QUEUE_KEY)
            .arg(POLL_TIMEOUT_SECS)
            .query_async(conn)
            .await?;
        Ok(popped.and_then(|(_, raw)| parse_job_id(&raw)))
    }
}

fn parse_job_id(raw: &str) -> Option<Uuid> {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Dropping malformed draft queue entry: {raw:?}");
            None
        }
    }
}

/// Re-queues jobs left in `drafting` by a previous process.
pub async fn requeue_interrupted(state: &AppState) -> Result<usize, AppError> {
    let ids = drafting_job_ids(&state.db).await?;
    for id in &ids {
        state.drafts.enqueue(*id).await?;
    }
    if !ids.is_empty() {
        info!("Re-queued {} interrupted drafts", ids.len());
    }
    Ok(ids.len())
}

/// Starts the worker loop on its own task. Jobs are processed one at a time.
pub fn spawn_draft_worker(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Draft worker started");
        loop {
            let mut conn = match state.redis.get_multiplexed_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Draft worker cannot reach Redis: {e}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            loop {
                match state.drafts.next(&mut conn).await {
                    Ok(Some(job_id)) => {
                        if let Err(e) = run_draft_pipeline(&state, job_id).await {
                            warn!("Draft run for job {job_id} ended with error: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Draft queue read failed, reconnecting: {e}");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        break;
                    }
                }
            }
        }
    })
}
