//! Request identity. Session validation happens at the edge (Clerk); the proxy
//! forwards the verified Clerk user id in `x-user-id`. This module maps that id
//! onto a local `users` row, creating it (and its signup credits) on first sight.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;

use crate::billing::credits::{grant_credits, CreditReason};
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

const MAX_EXTERNAL_ID_LEN: usize = 255;

/// The authenticated caller. Add it as a handler argument to require auth.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

#[derive(FromRow)]
struct UpsertedUser {
    id: Uuid,
    external_id: String,
    email: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    inserted: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let external_id =
            header_value(parts, USER_ID_HEADER).ok_or(AppError::Unauthorized)?;
        if external_id.len() > MAX_EXTERNAL_ID_LEN {
            return Err(AppError::Unauthorized);
        }
        let email = header_value(parts, USER_EMAIL_HEADER);

        // The user row and its signup grant commit together; a failed grant
        // rolls the user back so the next request retries both.
        let mut tx = state.db.begin().await?;
        let row: UpsertedUser = sqlx::query_as(
            r#"
            INSERT INTO users (external_id, email)
            VALUES ($1, $2)
            ON CONFLICT (external_id)
                DO UPDATE SET email = COALESCE(EXCLUDED.email, users.email)
            RETURNING id, external_id, email, created_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(&external_id)
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(amount) = signup_grant(row.inserted, state.config.free_credits) {
            grant_credits(&mut *tx, row.id, amount, CreditReason::SignupBonus, None).await?;
            info!("Created user {} with {amount} signup credits", row.id);
        }
        tx.commit().await?;

        Ok(CurrentUser(User {
            id: row.id,
            external_id: row.external_id,
            email: row.email,
            created_at: row.created_at,
        }))
    }
}

/// Credits to grant with this upsert: only on first insert, and only when
/// signup credits are configured.
fn signup_grant(inserted: bool, free_credits: i32) -> Option<i32> {
    (inserted && free_credits > 0).then_some(free_credits)
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_grant_only_for_new_users() {
        assert_eq!(signup_grant(true, 3), Some(3));
        assert_eq!(signup_grant(false, 3), None);
        assert_eq!(signup_grant(true, 0), None);
    }
}
