//! Proposal persistence. Every status change is a conditional UPDATE on the
//! expected current status, so concurrent requests cannot skip a transition.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::billing::credits::consume_credit;
use crate::errors::AppError;
use crate::models::proposal::ProposalRow;
use crate::proposals::lifecycle::ProposalStatus;
use crate::proposals::pricing::{
    resolve_price_range, validate_price_range, validate_scope_items, ScopeItem,
};

/// Validated input for a new proposal.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub job_id: Option<Uuid>,
    pub title: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub scope_items: Vec<ScopeItem>,
    pub price_low_cents: Option<i64>,
    pub price_high_cents: Option<i64>,
    pub notes: Option<String>,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProposalPatch {
    pub title: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub scope_items: Option<Vec<ScopeItem>>,
    pub price_low_cents: Option<i64>,
    pub price_high_cents: Option<i64>,
    pub notes: Option<String>,
}

/// What the client sees through the share link.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProposal {
    pub title: String,
    pub client_name: String,
    pub client_address: Option<String>,
    pub scope_items: serde_json::Value,
    pub price_low_cents: i64,
    pub price_high_cents: i64,
    pub status: String,
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub signature_name: Option<String>,
    pub signed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub declined_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ProposalRow> for PublicProposal {
    fn from(row: ProposalRow) -> Self {
        Self {
            title: row.title,
            client_name: row.client_name,
            client_address: row.client_address,
            scope_items: row.scope_items,
            price_low_cents: row.price_low_cents,
            price_high_cents: row.price_high_cents,
            status: row.status,
            sent_at: row.sent_at,
            signature_name: row.signature_name,
            signed_at: row.signed_at,
            declined_at: row.declined_at,
        }
    }
}

pub fn parse_status(row: &ProposalRow) -> Result<ProposalStatus, AppError> {
    row.status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn new_share_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Creates a proposal and spends one credit in a single transaction.
pub async fn create_proposal(
    pool: &PgPool,
    user_id: Uuid,
    input: NewProposal,
) -> Result<ProposalRow, AppError> {
    let mut tx = pool.begin().await?;
    let row = create_proposal_in_tx(&mut tx, user_id, input).await?;
    tx.commit().await?;
    Ok(row)
}

/// Shared by direct creation and mobile job submission.
pub async fn create_proposal_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    input: NewProposal,
) -> Result<ProposalRow, AppError> {
    let title = require_text("title", &input.title)?;
    let client_name = require_text("client_name", &input.client_name)?;
    validate_scope_items(&input.scope_items)?;
    let (low, high) = resolve_price_range(
        &input.scope_items,
        input.price_low_cents,
        input.price_high_cents,
    )?;

    let proposal_id = Uuid::new_v4();
    consume_credit(tx, user_id, &format!("proposal:{proposal_id}")).await?;

    let scope_json = serde_json::to_value(&input.scope_items)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize scope: {e}")))?;

    let row = sqlx::query_as::<_, ProposalRow>(
        r#"
        INSERT INTO proposals
            (id, user_id, job_id, title, client_name, client_email, client_address,
             scope_items, price_low_cents, price_high_cents, notes, status, share_token)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'draft', $12)
        RETURNING *
        "#,
    )
    .bind(proposal_id)
    .bind(user_id)
    .bind(input.job_id)
    .bind(&title)
    .bind(&client_name)
    .bind(optional_text(input.client_email))
    .bind(optional_text(input.client_address))
    .bind(&scope_json)
    .bind(low)
    .bind(high)
    .bind(optional_text(input.notes))
    .bind(new_share_token())
    .fetch_one(&mut **tx)
    .await?;

    info!("Created proposal {} for user {}", row.id, user_id);
    Ok(row)
}

pub async fn get_owned(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<ProposalRow, AppError> {
    sqlx::query_as::<_, ProposalRow>("SELECT * FROM proposals WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Proposal {id} not found")))
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<ProposalStatus>,
) -> Result<Vec<ProposalRow>, AppError> {
    Ok(sqlx::query_as::<_, ProposalRow>(
        r#"
        SELECT * FROM proposals
        WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status.map(ProposalStatus::as_str))
    .fetch_all(pool)
    .await?)
}

pub async fn update_proposal(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    patch: ProposalPatch,
) -> Result<ProposalRow, AppError> {
    let existing = get_owned(pool, user_id, id).await?;
    let status = parse_status(&existing)?;
    if !status.is_editable() {
        return Err(AppError::Conflict(format!(
            "Proposal {id} is {status} and can no longer be edited"
        )));
    }

    let title = match patch.title {
        Some(t) => require_text("title", &t)?,
        None => existing.title.clone(),
    };
    let client_name = match patch.client_name {
        Some(n) => require_text("client_name", &n)?,
        None => existing.client_name.clone(),
    };

    let scope_changed = patch.scope_items.is_some();
    let scope_items: Vec<ScopeItem> = match patch.scope_items {
        Some(items) => {
            validate_scope_items(&items)?;
            items
        }
        None => serde_json::from_value(existing.scope_items.clone())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Stored scope is invalid: {e}")))?,
    };

    let (low, high) = match (patch.price_low_cents, patch.price_high_cents) {
        (None, None) if scope_changed => resolve_price_range(&scope_items, None, None)?,
        (None, None) => (existing.price_low_cents, existing.price_high_cents),
        (low, high) => {
            let low = low.unwrap_or(existing.price_low_cents);
            let high = high.unwrap_or(existing.price_high_cents);
            validate_price_range(low, high)?;
            (low, high)
        }
    };

    let scope_json = serde_json::to_value(&scope_items)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize scope: {e}")))?;

    let client_email = patch.client_email.map_or(existing.client_email, |v| optional_text(Some(v)));
    let client_address =
        patch.client_address.map_or(existing.client_address, |v| optional_text(Some(v)));
    let notes = patch.notes.map_or(existing.notes, |v| optional_text(Some(v)));

    sqlx::query_as::<_, ProposalRow>(
        r#"
        UPDATE proposals
        SET title = $3, client_name = $4, client_email = $5, client_address = $6,
            scope_items = $7, price_low_cents = $8, price_high_cents = $9, notes = $10,
            updated_at = now()
        WHERE id = $1 AND user_id = $2 AND status = $11
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&title)
    .bind(&client_name)
    .bind(client_email)
    .bind(client_address)
    .bind(&scope_json)
    .bind(low)
    .bind(high)
    .bind(notes)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Proposal {id} changed while being edited")))
}

pub async fn delete_proposal(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let existing = get_owned(pool, user_id, id).await?;
    let status = parse_status(&existing)?;
    if !status.is_deletable() {
        return Err(AppError::Conflict(format!(
            "Proposal {id} is {status} and cannot be deleted"
        )));
    }

    let deleted = sqlx::query(
        "DELETE FROM proposals WHERE id = $1 AND user_id = $2 AND status <> 'accepted'",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::Conflict(format!("Proposal {id} was accepted")));
    }
    info!("Deleted proposal {id}");
    Ok(())
}

/// Marks a proposal as sent. Resending an already-sent proposal only refreshes `sent_at`.
pub async fn mark_sent(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<ProposalRow, AppError> {
    let existing = get_owned(pool, user_id, id).await?;
    let status = parse_status(&existing)?;
    if !status.can_transition_to(ProposalStatus::Sent) {
        return Err(AppError::Conflict(format!(
            "Proposal {id} is {status} and cannot be sent"
        )));
    }

    sqlx::query_as::<_, ProposalRow>(
        r#"
        UPDATE proposals
        SET status = 'sent', sent_at = now(), updated_at = now()
        WHERE id = $1 AND user_id = $2 AND status IN ('draft', 'sent')
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Proposal {id} changed while being sent")))
}

pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<ProposalRow, AppError> {
    sqlx::query_as::<_, ProposalRow>("SELECT * FROM proposals WHERE share_token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Proposal not found".to_string()))
}

/// Records the client's signature. Only a `sent` proposal can be accepted.
pub async fn accept_by_token(
    pool: &PgPool,
    token: &str,
    signature_name: &str,
) -> Result<ProposalRow, AppError> {
    let signature_name = require_text("signature_name", signature_name)?;
    let existing = find_by_token(pool, token).await?;
    let status = parse_status(&existing)?;
    if status.is_terminal() {
        return Err(AppError::Conflict(format!("Proposal was already {status}")));
    }
    if !status.can_transition_to(ProposalStatus::Accepted) {
        return Err(AppError::Conflict(format!(
            "Proposal is {status} and cannot be accepted"
        )));
    }

    let row = sqlx::query_as::<_, ProposalRow>(
        r#"
        UPDATE proposals
        SET status = 'accepted', signature_name = $2, signed_at = now(), updated_at = now()
        WHERE share_token = $1 AND status = 'sent'
        RETURNING *
        "#,
    )
    .bind(token)
    .bind(&signature_name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Proposal changed before it could be accepted".to_string()))?;

    info!("Proposal {} accepted by '{}'", row.id, signature_name);
    Ok(row)
}

pub async fn decline_by_token(
    pool: &PgPool,
    token: &str,
    reason: Option<String>,
) -> Result<ProposalRow, AppError> {
    let existing = find_by_token(pool, token).await?;
    let status = parse_status(&existing)?;
    if status.is_terminal() {
        return Err(AppError::Conflict(format!("Proposal was already {status}")));
    }
    if !status.can_transition_to(ProposalStatus::Declined) {
        return Err(AppError::Conflict(format!(
            "Proposal is {status} and cannot be declined"
        )));
    }

    let row = sqlx::query_as::<_, ProposalRow>(
        r#"
        UPDATE proposals
        SET status = 'declined', declined_at = now(), decline_reason = $2, updated_at = now()
        WHERE share_token = $1 AND status = 'sent'
        RETURNING *
        "#,
    )
    .bind(token)
    .bind(optional_text(reason))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Proposal changed before it could be declined".to_string()))?;

    info!("Proposal {} declined", row.id);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_trims_and_rejects_blank() {
        assert_eq!(require_text("title", "  Roof  ").unwrap(), "Roof");
        assert!(matches!(
            require_text("title", "   "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_optional_text_drops_blank() {
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(optional_text(Some(" a@b.co ".to_string())), Some("a@b.co".to_string()));
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn test_share_tokens_are_unique_hex() {
        let a = new_share_token();
        let b = new_share_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
