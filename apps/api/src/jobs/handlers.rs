//! Axum route handlers for the mobile Jobs API.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::drafting::draft::Tier;
use crate::drafting::status::PhotoStatus;
use crate::errors::AppError;
use crate::jobs::service::{
    begin_drafting, count_photos, create_job, finish_draft_failed, get_owned_job, insert_photo,
    list_jobs, list_photos, parse_job_status, reset_failed_photo, submit_job, NewJob,
};
use crate::models::job::{JobPhotoRow, MobileJobRow};
use crate::models::proposal::ProposalRow;
use crate::state::AppState;
use crate::storage::{photo_key, put_object};
use crate::vision::extension_for;

const PHOTO_FIELD: &str = "photo";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub customer_name: String,
    pub address: Option<String>,
    pub trade: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: MobileJobRow,
    pub photos: Vec<JobPhotoRow>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct PhotoSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub analyzed: usize,
    pub failed: usize,
}

impl PhotoSummary {
    pub fn from_photos(photos: &[JobPhotoRow]) -> Self {
        let mut summary = PhotoSummary {
            total: photos.len(),
            ..Default::default()
        };
        for photo in photos {
            match photo.status.parse::<PhotoStatus>() {
                Ok(PhotoStatus::Pending) => summary.pending += 1,
                Ok(PhotoStatus::Processing) => summary.processing += 1,
                Ok(PhotoStatus::Analyzed) => summary.analyzed += 1,
                Ok(PhotoStatus::Failed) | Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Serialize)]
pub struct DraftStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub draft: Option<serde_json::Value>,
    pub error: Option<String>,
    pub draft_attempts: i32,
    pub photos: PhotoSummary,
}

impl DraftStatusResponse {
    fn new(job: MobileJobRow, photos: &[JobPhotoRow]) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            draft: job.draft,
            error: job.draft_error,
            draft_attempts: job.draft_attempts,
            photos: PhotoSummary::from_photos(photos),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub tier: Tier,
    pub title: Option<String>,
    pub client_email: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs
pub async fn handle_create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<MobileJobRow>), AppError> {
    let job = create_job(
        &state.db,
        user.id(),
        NewJob {
            customer_name: request.customer_name,
            address: request.address,
            trade: request.trade,
            notes: request.notes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs
pub async fn handle_list(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<MobileJobRow>>, AppError> {
    Ok(Json(list_jobs(&state.db, user.id()).await?))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JobDetail>, AppError> {
    let job = get_owned_job(&state.db, user.id(), id).await?;
    let photos = list_photos(&state.db, id).await?;
    Ok(Json(JobDetail { job, photos }))
}

/// POST /api/v1/jobs/:id/photos
///
/// Multipart upload with a single `photo` field. The bytes go to S3 before the
/// row is written, so a photo row always points at a stored object.
pub async fn handle_upload_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JobPhotoRow>), AppError> {
    let job = get_owned_job(&state.db, user.id(), job_id).await?;
    let status = parse_job_status(&job)?;
    if !status.accepts_photos() {
        return Err(AppError::Conflict(format!(
            "Job {job_id} is {status}; photos cannot be added now"
        )));
    }
    if count_photos(&state.db, job_id).await? >= state.config.max_photos_per_job {
        return Err(AppError::Validation(format!(
            "A job can hold at most {} photos",
            state.config.max_photos_per_job
        )));
    }

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or_default();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read photo: {e}")))?;
        upload = Some((content_type, data));
        break;
    }

    let (content_type, data) = upload
        .ok_or_else(|| AppError::Validation(format!("Missing multipart field '{PHOTO_FIELD}'")))?;
    let extension = validate_photo(&content_type, data.len(), state.config.max_photo_bytes)?;

    let photo_id = Uuid::new_v4();
    let key = photo_key(job_id, photo_id, extension);
    let size_bytes = data.len() as i64;
    put_object(
        &state.s3,
        &state.config.s3_bucket,
        &key,
        data,
        &content_type,
    )
    .await?;

    let photo = insert_photo(&state.db, photo_id, job_id, &key, &content_type, size_bytes).await?;
    info!("Photo {photo_id} added to job {job_id} ({size_bytes} bytes)");
    Ok((StatusCode::CREATED, Json(photo)))
}

/// POST /api/v1/jobs/:id/photos/:photo_id/retry
pub async fn handle_retry_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((job_id, photo_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<JobPhotoRow>, AppError> {
    get_owned_job(&state.db, user.id(), job_id).await?;
    Ok(Json(reset_failed_photo(&state.db, job_id, photo_id).await?))
}

/// POST /api/v1/jobs/:id/draft
///
/// Queues a draft run and returns 202. If one is already running, returns
/// its current state without queueing another.
pub async fn handle_start_draft(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<DraftStatusResponse>), AppError> {
    let start = begin_drafting(&state.db, user.id(), job_id).await?;
    if start.started {
        let db = &state.db;
        enqueue_or_fail(
            || state.drafts.enqueue(job_id),
            move |message| async move { finish_draft_failed(db, job_id, &message).await },
        )
        .await?;
    } else {
        info!("Job {job_id} already drafting, not queueing again");
    }
    let photos = list_photos(&state.db, job_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DraftStatusResponse::new(start.job, &photos)),
    ))
}

/// GET /api/v1/jobs/:id/draft
pub async fn handle_get_draft(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DraftStatusResponse>, AppError> {
    let job = get_owned_job(&state.db, user.id(), job_id).await?;
    let photos = list_photos(&state.db, job_id).await?;
    Ok(Json(DraftStatusResponse::new(job, &photos)))
}

/// POST /api/v1/jobs/:id/submit
pub async fn handle_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<ProposalRow>, AppError> {
    let proposal = submit_job(
        &state.db,
        user.id(),
        job_id,
        request.tier,
        request.title,
        request.client_email,
    )
    .await?;
    Ok(Json(proposal))
}

/// Runs `enqueue`; if it fails, hands the error text to `fail` so the job does
/// not stay `drafting` with nothing queued, then returns the enqueue error.
async fn enqueue_or_fail<E, EF, F, FF>(enqueue: E, fail: F) -> Result<(), AppError>
where
    E: FnOnce() -> EF,
    EF: Future<Output = Result<(), AppError>>,
    F: FnOnce(String) -> FF,
    FF: Future<Output = Result<bool, AppError>>,
{
    let Err(e) = enqueue().await else {
        return Ok(());
    };
    if let Err(undo) = fail(format!("Could not queue draft: {e}")).await {
        error!("Failed to release job after queue error: {undo}");
    }
    Err(e)
}

/// Checks type and size and returns the object key extension.
fn validate_photo(content_type: &str, len: usize, max_bytes: usize) -> Result<&'static str, AppError> {
    let extension = extension_for(content_type).ok_or_else(|| {
        AppError::Validation(format!(
            "Unsupported photo type '{content_type}'; use JPEG, PNG or WebP"
        ))
    })?;
    if len == 0 {
        return Err(AppError::Validation("Photo is empty".to_string()));
    }
    if len > max_bytes {
        return Err(AppError::Validation(format!(
            "Photo is {len} bytes; the limit is {max_bytes}"
        )));
    }
    Ok(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    fn photo(status: &str) -> JobPhotoRow {
        JobPhotoRow {
            id: Uuid::new_v4(),
            job_id: Uuid::nil(),
            s3_key: "k".to_string(),
            content_type: "image/jpeg".to_string(),
            size_bytes: 1,
            status: status.to_string(),
            findings: None,
            analysis_attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_photo_summary_counts() {
        let photos = vec![
            photo("pending"),
            photo("analyzed"),
            photo("analyzed"),
            photo("failed"),
            photo("processing"),
        ];
        assert_eq!(
            PhotoSummary::from_photos(&photos),
            PhotoSummary {
                total: 5,
                pending: 1,
                processing: 1,
                analyzed: 2,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_validate_photo() {
        assert_eq!(validate_photo("image/jpeg", 10, 100).unwrap(), "jpg");
        assert_eq!(validate_photo("image/webp", 100, 100).unwrap(), "webp");
        assert!(matches!(
            validate_photo("image/gif", 10, 100),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_photo("image/png", 0, 100),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_photo("image/png", 101, 100),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_submit_request_tier_is_uppercase() {
        let req: SubmitRequest = serde_json::from_str(r#"{"tier":"BEST"}"#).unwrap();
        assert_eq!(req.tier, Tier::Best);
        assert!(req.title.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_failure_fails_the_job() {
        let failures = Mutex::new(Vec::new());
        let result = enqueue_or_fail(
            || async { Err(AppError::Internal(anyhow::anyhow!("redis down"))) },
            |message| {
                failures.lock().unwrap().push(message);
                async { Ok(true) }
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        let failures = failures.into_inner().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("redis down"), "{}", failures[0]);
    }

    #[tokio::test]
    async fn test_enqueue_success_leaves_job_alone() {
        let mut failed = false;
        let result = enqueue_or_fail(
            || async { Ok(()) },
            |_| {
                failed = true;
                async { Ok(true) }
            },
        )
        .await;
        assert!(result.is_ok());
        assert!(!failed);
    }

    #[tokio::test]
    async fn test_enqueue_error_survives_failed_undo() {
        let result = enqueue_or_fail(
            || async { Err(AppError::Internal(anyhow::anyhow!("redis down"))) },
            |_| async { Err(AppError::Internal(anyhow::anyhow!("db down"))) },
        )
        .await;
        match result {
            Err(AppError::Internal(e)) => assert!(e.to_string().contains("redis down")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
