use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::billing::credits::balance;
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub credits: i64,
}

/// GET /api/v1/me
/// The first call for a new user also creates the account and its signup credits.
pub async fn handle_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<MeResponse>, AppError> {
    let credits = balance(&state.db, user.id()).await?;
    Ok(Json(MeResponse {
        user: user.0,
        credits,
    }))
}
