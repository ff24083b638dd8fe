//! Credit ledger. Append-only: balances are always `SUM(delta)`, never a stored counter.

use serde::Serialize;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::billing::CreditTransactionRow;

/// Credits charged for one proposal.
pub const PROPOSAL_COST: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditReason {
    SignupBonus,
    Purchase,
    Proposal,
}

impl CreditReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CreditReason::SignupBonus => "signup_bonus",
            CreditReason::Purchase => "purchase",
            CreditReason::Proposal => "proposal",
        }
    }
}

/// A purchasable bundle of credits. Priced inline on the Checkout Session.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CreditPack {
    pub id: &'static str,
    pub name: &'static str,
    pub credits: i32,
    pub amount_cents: i64,
}

pub const CREDIT_PACKS: &[CreditPack] = &[
    CreditPack {
        id: "single",
        name: "1 proposal credit",
        credits: 1,
        amount_cents: 1_500,
    },
    CreditPack {
        id: "five",
        name: "5 proposal credits",
        credits: 5,
        amount_cents: 6_000,
    },
    CreditPack {
        id: "twenty",
        name: "20 proposal credits",
        credits: 20,
        amount_cents: 20_000,
    },
];

pub fn find_pack(id: &str) -> Option<&'static CreditPack> {
    CREDIT_PACKS.iter().find(|p| p.id == id)
}

/// Inserts a positive ledger entry. Returns false when the entry already existed
/// (purchase references are unique, so webhook redelivery is a no-op).
pub async fn grant_credits<'e, E>(
    executor: E,
    user_id: Uuid,
    amount: i32,
    reason: CreditReason,
    reference: Option<&str>,
) -> Result<bool, AppError>
where
    E: PgExecutor<'e>,
{
    if amount <= 0 {
        return Err(AppError::Validation(format!(
            "credit grant must be positive, got {amount}"
        )));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO credit_transactions (user_id, delta, reason, reference)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(reason.as_str())
    .bind(reference)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn balance<'e, E>(executor: E, user_id: Uuid) -> Result<i64, AppError>
where
    E: PgExecutor<'e>,
{
    let balance: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(delta), 0)::BIGINT FROM credit_transactions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(balance)
}

pub async fn recent_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<CreditTransactionRow>, AppError> {
    Ok(sqlx::query_as::<_, CreditTransactionRow>(
        r#"
        SELECT * FROM credit_transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// Spends one credit inside the caller's transaction.
///
/// The user row is locked first so two concurrent proposal creations cannot
/// both observe the last remaining credit. Returns the balance after the charge.
pub async fn consume_credit(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    reference: &str,
) -> Result<i64, AppError> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

    let current = balance(&mut **tx, user_id).await?;
    ensure_sufficient(current, PROPOSAL_COST)?;

    sqlx::query(
        r#"
        INSERT INTO credit_transactions (user_id, delta, reason, reference)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(-(PROPOSAL_COST as i32))
    .bind(CreditReason::Proposal.as_str())
    .bind(reference)
    .execute(&mut **tx)
    .await?;

    let remaining = current - PROPOSAL_COST;
    info!("Consumed {PROPOSAL_COST} credit for user {user_id} ({reference}); {remaining} left");
    Ok(remaining)
}

fn ensure_sufficient(balance: i64, cost: i64) -> Result<(), AppError> {
    if balance < cost {
        return Err(AppError::PaymentRequired(format!(
            "This action needs {cost} credit(s) but the balance is {balance}. Purchase more credits to continue."
        )));
    }
    Ok(())
}
