//! Draft pipeline: analyze every photo that still needs it, fold the findings
//! together, synthesize the three-tier draft, and land the job in `ready` or
//! `failed`.
//!
//! Photo analysis is idempotent per photo. A photo that is already `analyzed`
//! keeps its stored findings and is never sent to the vision backend again, so
//! re-running a failed draft only pays for the photos that failed.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::drafting::aggregate::{aggregate_findings, JobFindings};
use crate::drafting::draft::{normalize_draft, DraftPayload};
use crate::drafting::status::{JobStatus, PhotoStatus};
use crate::drafting::synthesizer::synthesize_draft;
use crate::errors::AppError;
use crate::jobs::service::{
    finish_draft_failed, finish_draft_ready, get_job, list_photos, mark_photo_analyzed,
    mark_photo_failed, mark_photo_processing, parse_job_status, record_draft_attempt,
};
use crate::models::job::{JobPhotoRow, MobileJobRow};
use crate::state::AppState;
use crate::storage::get_object_bytes;
use crate::vision::{JobContext, PhotoAnalyzer, PhotoFindings, PhotoInput};

/// Analysis attempts per photo within one pipeline run.
pub const PHOTO_ATTEMPTS_PER_RUN: u32 = 2;
const PHOTO_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Runs the pipeline for one job. Jobs that are not `drafting` are skipped.
///
/// Errors are recorded on the job (`failed` + `draft_error`); the returned
/// error is only for the caller's logs.
pub async fn run_draft_pipeline(state: &AppState, job_id: Uuid) -> Result<(), AppError> {
    let Some(job) = get_job(&state.db, job_id).await? else {
        warn!("Draft requested for unknown job {job_id}");
        return Ok(());
    };
    if parse_job_status(&job)? != JobStatus::Drafting {
        info!("Job {job_id} is {}, skipping draft run", job.status);
        return Ok(());
    }

    record_draft_attempt(&state.db, job_id).await?;
    info!("Drafting job {job_id} (attempt {})", job.draft_attempts + 1);

    match build_draft(state, &job).await {
        Ok(draft) => {
            if finish_draft_ready(&state.db, job_id, &draft).await? {
                info!("Job {job_id} draft ready");
            } else {
                warn!("Job {job_id} left drafting before its draft was stored");
            }
            Ok(())
        }
        Err(e) => {
            error!("Draft for job {job_id} failed: {e}");
            finish_draft_failed(&state.db, job_id, &e.to_string()).await?;
            Err(e)
        }
    }
}

async fn build_draft(state: &AppState, job: &MobileJobRow) -> Result<DraftPayload, AppError> {
    let photos = list_photos(&state.db, job.id).await?;
    if photos.is_empty() {
        return Err(AppError::Validation(format!("Job {} has no photos", job.id)));
    }

    let context = JobContext {
        trade: job.trade.clone(),
        address: job.address.clone(),
        notes: job.notes.clone(),
    };

    let pending = photos_needing_analysis(&photos);
    info!(
        "Job {}: {} photos, {} need analysis",
        job.id,
        photos.len(),
        pending.len()
    );
    for photo in pending {
        analyze_photo(
            state,
            state.photo_analyzer.as_ref(),
            photo,
            &context,
            PHOTO_RETRY_DELAY,
        )
        .await?;
    }

    // Re-read so the findings reflect what was actually persisted.
    let photos = list_photos(&state.db, job.id).await?;
    let (analyzed, failed_count) = collect_findings(&photos);
    if analyzed.is_empty() {
        return Err(AppError::UnprocessableEntity(format!(
            "None of the {} photos could be analyzed",
            photos.len()
        )));
    }

    let findings: JobFindings = aggregate_findings(&analyzed, failed_count);
    let draft = synthesize_draft(&state.llm, job, &findings).await?;
    Ok(normalize_draft(draft, &findings))
}

/// What became of one photo in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoOutcome {
    Analyzed,
    Failed,
    /// Another run analyzed it first.
    AlreadyAnalyzed,
}

/// Storage the per-photo attempt loop needs.
#[async_trait]
pub trait PhotoAttemptStore: Send + Sync {
    /// Claims the photo and counts an attempt. `false` once the photo is analyzed.
    async fn begin_attempt(&self, photo_id: Uuid) -> Result<bool, AppError>;
    async fn fetch_bytes(&self, s3_key: &str) -> Result<Vec<u8>, AppError>;
    async fn mark_analyzed(&self, photo_id: Uuid, findings: &PhotoFindings) -> Result<(), AppError>;
    async fn mark_failed(&self, photo_id: Uuid, error: &str) -> Result<(), AppError>;
}

#[async_trait]
impl PhotoAttemptStore for AppState {
    async fn begin_attempt(&self, photo_id: Uuid) -> Result<bool, AppError> {
        Ok(mark_photo_processing(&self.db, photo_id).await?.is_some())
    }

    async fn fetch_bytes(&self, s3_key: &str) -> Result<Vec<u8>, AppError> {
        get_object_bytes(&self.s3, &self.config.s3_bucket, s3_key).await
    }

    async fn mark_analyzed(&self, photo_id: Uuid, findings: &PhotoFindings) -> Result<(), AppError> {
        let value = serde_json::to_value(findings).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to serialize findings: {e}"))
        })?;
        mark_photo_analyzed(&self.db, photo_id, &value).await
    }

    async fn mark_failed(&self, photo_id: Uuid, error: &str) -> Result<(), AppError> {
        mark_photo_failed(&self.db, photo_id, error).await
    }
}

/// Analyzes one photo with up to `PHOTO_ATTEMPTS_PER_RUN` attempts. Each
/// attempt fetches the object and calls the analyzer, so a missing object
/// costs an attempt like any other failure. A photo that keeps failing is
/// marked `failed` and the run carries on; only database errors abort it.
pub async fn analyze_photo(
    store: &dyn PhotoAttemptStore,
    analyzer: &dyn PhotoAnalyzer,
    photo: &JobPhotoRow,
    context: &JobContext,
    retry_delay: Duration,
) -> Result<PhotoOutcome, AppError> {
    let mut last_error = String::new();
    for attempt in 1..=PHOTO_ATTEMPTS_PER_RUN {
        if !store.begin_attempt(photo.id).await? {
            return Ok(PhotoOutcome::AlreadyAnalyzed);
        }

        let result = match store.fetch_bytes(&photo.s3_key).await {
            Ok(bytes) => {
                let input = PhotoInput {
                    photo_id: photo.id,
                    s3_key: photo.s3_key.clone(),
                    content_type: photo.content_type.clone(),
                    bytes,
                    context: context.clone(),
                };
                analyzer.analyze(&input).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(findings) => {
                store.mark_analyzed(photo.id, &findings).await?;
                info!("Photo {} analyzed on attempt {attempt}", photo.id);
                return Ok(PhotoOutcome::Analyzed);
            }
            Err(e) => {
                warn!(
                    "Photo {} analysis attempt {}/{} failed: {}",
                    photo.id, attempt, PHOTO_ATTEMPTS_PER_RUN, e
                );
                last_error = e.to_string();
                if attempt < PHOTO_ATTEMPTS_PER_RUN {
                    tokio::time::sleep(retry_delay * attempt).await;
                }
            }
        }
    }

    store.mark_failed(photo.id, &last_error).await?;
    Ok(PhotoOutcome::Failed)
}

/// Photos that have no stored findings yet, in upload order.
pub fn photos_needing_analysis(photos: &[JobPhotoRow]) -> Vec<&JobPhotoRow> {
    photos
        .iter()
        .filter(|p| {
            p.status
                .parse::<PhotoStatus>()
                .map(|s| s.needs_analysis())
                .unwrap_or(true)
        })
        .collect()
}

/// Splits photos into parsed findings and a count of photos without usable findings.
pub fn collect_findings(photos: &[JobPhotoRow]) -> (Vec<(Uuid, PhotoFindings)>, usize) {
    let mut analyzed = Vec::new();
    let mut failed = 0;
    for photo in photos {
        let parsed = match (photo.status.parse::<PhotoStatus>(), &photo.findings) {
            (Ok(PhotoStatus::Analyzed), Some(value)) => {
                serde_json::from_value::<PhotoFindings>(value.clone()).ok()
            }
            _ => None,
        };
        match parsed {
            Some(findings) => analyzed.push((photo.id, findings)),
            None => failed += 1,
        }
    }
    (analyzed, failed)
}
