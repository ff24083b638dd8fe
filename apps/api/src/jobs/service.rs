//! Mobile job and photo persistence.
//!
//! Status changes are compare-and-set UPDATEs (`WHERE status = ...`), which is
//! what keeps a job to a single draft run at a time.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::drafting::draft::{DraftPayload, Tier};
use crate::drafting::status::{JobStatus, PhotoStatus};
use crate::errors::AppError;
use crate::models::job::{JobPhotoRow, MobileJobRow};
use crate::models::proposal::ProposalRow;
use crate::proposals::service::{create_proposal_in_tx, NewProposal};

const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct NewJob {
    pub customer_name: String,
    pub address: Option<String>,
    pub trade: Option<String>,
    pub notes: Option<String>,
}

/// Result of asking for a draft run.
#[derive(Debug)]
pub struct DraftStart {
    pub job: MobileJobRow,
    /// False when a run was already in progress; nothing new was queued.
    pub started: bool,
}

pub fn parse_job_status(job: &MobileJobRow) -> Result<JobStatus, AppError> {
    job.status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}

// ────────────────────────────────────────────────────────────────────────────
// Jobs
// ────────────────────────────────────────────────────────────────────────────

pub async fn create_job(pool: &PgPool, user_id: Uuid, input: NewJob) -> Result<MobileJobRow, AppError> {
    let customer_name = input.customer_name.trim();
    if customer_name.is_empty() {
        return Err(AppError::Validation("customer_name cannot be empty".to_string()));
    }

    let job = sqlx::query_as::<_, MobileJobRow>(
        r#"
        INSERT INTO mobile_jobs (user_id, customer_name, address, trade, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(customer_name)
    .bind(clean(input.address))
    .bind(clean(input.trade))
    .bind(clean(input.notes))
    .bind(JobStatus::Capturing.as_str())
    .fetch_one(pool)
    .await?;

    info!("Created mobile job {} for user {}", job.id, user_id);
    Ok(job)
}

pub async fn list_jobs(pool: &PgPool, user_id: Uuid) -> Result<Vec<MobileJobRow>, AppError> {
    Ok(sqlx::query_as::<_, MobileJobRow>(
        "SELECT * FROM mobile_jobs WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_owned_job(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<MobileJobRow, AppError> {
    sqlx::query_as::<_, MobileJobRow>("SELECT * FROM mobile_jobs WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<MobileJobRow>, AppError> {
    Ok(
        sqlx::query_as::<_, MobileJobRow>("SELECT * FROM mobile_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Moves a job into `drafting` if its current status allows it.
pub async fn begin_drafting(pool: &PgPool, user_id: Uuid, job_id: Uuid) -> Result<DraftStart, AppError> {
    get_owned_job(pool, user_id, job_id).await?;
    if count_photos(pool, job_id).await? == 0 {
        return Err(AppError::Validation(
            "Upload at least one photo before drafting".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, MobileJobRow>(
        r#"
        UPDATE mobile_jobs
        SET status = $4, draft_error = NULL, updated_at = now()
        WHERE id = $1 AND user_id = $2 AND status = ANY($3)
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(user_id)
    .bind(JobStatus::draft_sources())
    .bind(JobStatus::Drafting.as_str())
    .fetch_optional(pool)
    .await?;

    if let Some(job) = updated {
        info!("Job {job_id} moved to drafting");
        return Ok(DraftStart { job, started: true });
    }

    let current = get_owned_job(pool, user_id, job_id).await?;
    match parse_job_status(&current)? {
        JobStatus::Drafting => Ok(DraftStart {
            job: current,
            started: false,
        }),
        status => Err(AppError::Conflict(format!(
            "Job {job_id} is {status} and cannot be drafted"
        ))),
    }
}

pub async fn record_draft_attempt(pool: &PgPool, job_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE mobile_jobs SET draft_attempts = draft_attempts + 1, updated_at = now() WHERE id = $1",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// `drafting → ready`. Returns false if the job was no longer drafting.
pub async fn finish_draft_ready(
    pool: &PgPool,
    job_id: Uuid,
    draft: &DraftPayload,
) -> Result<bool, AppError> {
    let draft_json = serde_json::to_value(draft)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize draft: {e}")))?;
    let result = sqlx::query(
        r#"
        UPDATE mobile_jobs
        SET status = $3, draft = $2, draft_error = NULL, updated_at = now()
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(job_id)
    .bind(draft_json)
    .bind(JobStatus::Ready.as_str())
    .bind(JobStatus::Drafting.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// `drafting → failed`. The previous draft, if any, is kept for reference.
pub async fn finish_draft_failed(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE mobile_jobs
        SET status = $3, draft_error = $2, updated_at = now()
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(job_id)
    .bind(truncate_error(error))
    .bind(JobStatus::Failed.as_str())
    .bind(JobStatus::Drafting.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn drafting_job_ids(pool: &PgPool) -> Result<Vec<Uuid>, AppError> {
    Ok(sqlx::query_scalar(
        "SELECT id FROM mobile_jobs WHERE status = $1 ORDER BY updated_at",
    )
    .bind(JobStatus::Drafting.as_str())
    .fetch_all(pool)
    .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// Photos
// ────────────────────────────────────────────────────────────────────────────

pub async fn list_photos(pool: &PgPool, job_id: Uuid) -> Result<Vec<JobPhotoRow>, AppError> {
    Ok(sqlx::query_as::<_, JobPhotoRow>(
        "SELECT * FROM job_photos WHERE job_id = $1 ORDER BY created_at, id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?)
}

pub async fn count_photos(pool: &PgPool, job_id: Uuid) -> Result<i64, AppError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM job_photos WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await?,
    )
}

pub async fn insert_photo(
    pool: &PgPool,
    photo_id: Uuid,
    job_id: Uuid,
    s3_key: &str,
    content_type: &str,
    size_bytes: i64,
) -> Result<JobPhotoRow, AppError> {
    Ok(sqlx::query_as::<_, JobPhotoRow>(
        r#"
        INSERT INTO job_photos (id, job_id, s3_key, content_type, size_bytes, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(photo_id)
    .bind(job_id)
    .bind(s3_key)
    .bind(content_type)
    .bind(size_bytes)
    .bind(PhotoStatus::Pending.as_str())
    .fetch_one(pool)
    .await?)
}

/// Puts a failed photo back in the queue for the next draft run.
/// Photos in any other status are returned unchanged.
pub async fn reset_failed_photo(
    pool: &PgPool,
    job_id: Uuid,
    photo_id: Uuid,
) -> Result<JobPhotoRow, AppError> {
    let reset = sqlx::query_as::<_, JobPhotoRow>(
        r#"
        UPDATE job_photos
        SET status = $3, last_error = NULL, updated_at = now()
        WHERE id = $1 AND job_id = $2 AND status = $4
        RETURNING *
        "#,
    )
    .bind(photo_id)
    .bind(job_id)
    .bind(PhotoStatus::Pending.as_str())
    .bind(PhotoStatus::Failed.as_str())
    .fetch_optional(pool)
    .await?;

    if let Some(photo) = reset {
        info!("Photo {photo_id} reset to pending");
        return Ok(photo);
    }

    sqlx::query_as::<_, JobPhotoRow>("SELECT * FROM job_photos WHERE id = $1 AND job_id = $2")
        .bind(photo_id)
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Photo {photo_id} not found")))
}

/// Claims a photo for analysis and counts the attempt. `None` means it is already analyzed.
pub async fn mark_photo_processing(pool: &PgPool, photo_id: Uuid) -> Result<Option<JobPhotoRow>, AppError> {
    Ok(sqlx::query_as::<_, JobPhotoRow>(
        r#"
        UPDATE job_photos
        SET status = $2, analysis_attempts = analysis_attempts + 1, updated_at = now()
        WHERE id = $1 AND status <> $3
        RETURNING *
        "#,
    )
    .bind(photo_id)
    .bind(PhotoStatus::Processing.as_str())
    .bind(PhotoStatus::Analyzed.as_str())
    .fetch_optional(pool)
    .await?)
}

pub async fn mark_photo_analyzed(
    pool: &PgPool,
    photo_id: Uuid,
    findings: &serde_json::Value,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE job_photos
        SET status = $3, findings = $2, last_error = NULL, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(photo_id)
    .bind(findings)
    .bind(PhotoStatus::Analyzed.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_photo_failed(pool: &PgPool, photo_id: Uuid, error: &str) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE job_photos
        SET status = $3, last_error = $2, updated_at = now()
        WHERE id = $1 AND status <> $4
        "#,
    )
    .bind(photo_id)
    .bind(truncate_error(error))
    .bind(PhotoStatus::Failed.as_str())
    .bind(PhotoStatus::Analyzed.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Submission
// ────────────────────────────────────────────────────────────────────────────

/// Builds the proposal input for the chosen package of a ready draft.
pub fn proposal_from_draft(
    job: &MobileJobRow,
    draft: &DraftPayload,
    tier: Tier,
    title: Option<String>,
    client_email: Option<String>,
) -> Result<NewProposal, AppError> {
    let package = draft
        .package(tier)
        .ok_or_else(|| AppError::Validation(format!("Draft has no {tier} package")))?;

    let title = clean(title).unwrap_or_else(|| format!("{} - {}", package.title, job.customer_name));

    let mut notes = vec![draft.summary.clone()];
    if !package.description.is_empty() {
        notes.push(package.description.clone());
    }
    if !draft.assumptions.is_empty() {
        notes.push(format!("Assumptions:\n- {}", draft.assumptions.join("\n- ")));
    }
    if !draft.exclusions.is_empty() {
        notes.push(format!("Exclusions:\n- {}", draft.exclusions.join("\n- ")));
    }

    Ok(NewProposal {
        job_id: Some(job.id),
        title,
        client_name: job.customer_name.clone(),
        client_email,
        client_address: job.address.clone(),
        scope_items: package.line_items.clone(),
        price_low_cents: Some(package.price_low_cents),
        price_high_cents: Some(package.price_high_cents),
        notes: Some(notes.join("\n\n")),
    })
}

/// Turns a ready draft into a proposal, spending one credit.
///
/// Idempotent: submitting an already-submitted job returns its proposal and
/// charges nothing.
pub async fn submit_job(
    pool: &PgPool,
    user_id: Uuid,
    job_id: Uuid,
    tier: Tier,
    title: Option<String>,
    client_email: Option<String>,
) -> Result<ProposalRow, AppError> {
    let mut tx = pool.begin().await?;

    let job = sqlx::query_as::<_, MobileJobRow>(
        "SELECT * FROM mobile_jobs WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(job_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let status = parse_job_status(&job)?;
    if status == JobStatus::Submitted {
        if let Some(proposal_id) = job.proposal_id {
            let existing = sqlx::query_as::<_, ProposalRow>("SELECT * FROM proposals WHERE id = $1")
                .bind(proposal_id)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(existing) = existing {
                info!("Job {job_id} already submitted as proposal {proposal_id}");
                return Ok(existing);
            }
        }
        return Err(AppError::Conflict(format!(
            "Job {job_id} was submitted but its proposal no longer exists"
        )));
    }
    if !status.can_transition_to(JobStatus::Submitted) {
        return Err(AppError::Conflict(format!(
            "Job {job_id} is {status}; only a ready draft can be submitted"
        )));
    }

    let draft: DraftPayload = job
        .draft
        .clone()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Ready job {job_id} has no draft")))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Stored draft is invalid: {e}")))
        })?;

    let input = proposal_from_draft(&job, &draft, tier, title, client_email)?;
    let proposal = create_proposal_in_tx(&mut tx, user_id, input).await?;

    sqlx::query(
        r#"
        UPDATE mobile_jobs
        SET status = $3, proposal_id = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(proposal.id)
    .bind(JobStatus::Submitted.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Job {job_id} submitted as proposal {} ({tier})", proposal.id);
    Ok(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafting::draft::DraftPackage;
    use crate::proposals::pricing::ScopeItem;
    use chrono::Utc;

    fn job() -> MobileJobRow {
        MobileJobRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            customer_name: "Sam Lee".to_string(),
            address: Some("4 Birch Ct".to_string()),
            trade: Some("gutters".to_string()),
            notes: None,
            status: "ready".to_string(),
            draft: None,
            draft_error: None,
            draft_attempts: 1,
            proposal_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn package(tier: Tier, cents: i64) -> DraftPackage {
        DraftPackage {
            tier,
            title: format!("{tier} gutters"),
            description: format!("{tier} description"),
            line_items: vec![ScopeItem {
                description: "Seamless gutter".to_string(),
                quantity: 1.0,
                unit: "ea".to_string(),
                unit_price_cents: cents,
            }],
            price_low_cents: cents,
            price_high_cents: cents + cents * 15 / 100,
        }
    }

    fn draft() -> DraftPayload {
        DraftPayload {
            summary: "Gutters are sagging.".to_string(),
            packages: vec![
                package(Tier::Good, 100_000),
                package(Tier::Better, 150_000),
                package(Tier::Best, 200_000),
            ],
            assumptions: vec!["Fascia is sound".to_string()],
            exclusions: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_proposal_from_chosen_package() {
        let job = job();
        let input = proposal_from_draft(&job, &draft(), Tier::Better, None, None).unwrap();
        assert_eq!(input.job_id, Some(job.id));
        assert_eq!(input.title, "BETTER gutters - Sam Lee");
        assert_eq!(input.client_name, "Sam Lee");
        assert_eq!(input.client_address.as_deref(), Some("4 Birch Ct"));
        assert_eq!(input.price_low_cents, Some(150_000));
        assert_eq!(input.price_high_cents, Some(172_500));
        assert_eq!(input.scope_items.len(), 1);
        let notes = input.notes.unwrap();
        assert!(notes.starts_with("Gutters are sagging."));
        assert!(notes.contains("BETTER description"));
        assert!(notes.contains("Assumptions:\n- Fascia is sound"));
        assert!(!notes.contains("Exclusions"));
    }

    #[test]
    fn test_custom_title_wins_unless_blank() {
        let job = job();
        let custom =
            proposal_from_draft(&job, &draft(), Tier::Good, Some(" Gutter job ".into()), None).unwrap();
        assert_eq!(custom.title, "Gutter job");
        let blank = proposal_from_draft(&job, &draft(), Tier::Good, Some("  ".into()), None).unwrap();
        assert_eq!(blank.title, "GOOD gutters - Sam Lee");
    }

    #[test]
    fn test_missing_tier_is_validation_error() {
        let mut d = draft();
        d.packages.retain(|p| p.tier != Tier::Best);
        assert!(matches!(
            proposal_from_draft(&job(), &d, Tier::Best, None, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        let long = "é".repeat(400);
        let truncated = truncate_error(&long);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= MAX_ERROR_LEN + '…'.len_utf8());
        assert_eq!(truncate_error("short"), "short");
    }
}
