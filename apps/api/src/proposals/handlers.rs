//! Axum route handlers for the Proposals API and the public share link.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::proposal::ProposalRow;
use crate::proposals::lifecycle::ProposalStatus;
use crate::proposals::pricing::ScopeItem;
use crate::proposals::service::{
    accept_by_token, create_proposal, decline_by_token, delete_proposal, find_by_token,
    get_owned, list_for_user, mark_sent, update_proposal, NewProposal, ProposalPatch,
    PublicProposal,
};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub title: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub scope_items: Vec<ScopeItem>,
    pub price_low_cents: Option<i64>,
    pub price_high_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProposalRequest {
    pub title: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub scope_items: Option<Vec<ScopeItem>>,
    pub price_low_cents: Option<i64>,
    pub price_high_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub proposal: ProposalRow,
    pub share_url: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub signature_name: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Owner handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/proposals
///
/// Spends one credit. Returns 402 when the balance is empty.
pub async fn handle_create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<ProposalRow>), AppError> {
    let row = create_proposal(
        &state.db,
        user.id(),
        NewProposal {
            job_id: None,
            title: request.title,
            client_name: request.client_name,
            client_email: request.client_email,
            client_address: request.client_address,
            scope_items: request.scope_items,
            price_low_cents: request.price_low_cents,
            price_high_cents: request.price_high_cents,
            notes: request.notes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/proposals?status=
pub async fn handle_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProposalRow>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ProposalStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    Ok(Json(list_for_user(&state.db, user.id(), status).await?))
}

/// GET /api/v1/proposals/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProposalRow>, AppError> {
    Ok(Json(get_owned(&state.db, user.id(), id).await?))
}

/// PATCH /api/v1/proposals/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProposalRequest>,
) -> Result<Json<ProposalRow>, AppError> {
    let patch = ProposalPatch {
        title: request.title,
        client_name: request.client_name,
        client_email: request.client_email,
        client_address: request.client_address,
        scope_items: request.scope_items,
        price_low_cents: request.price_low_cents,
        price_high_cents: request.price_high_cents,
        notes: request.notes,
    };
    Ok(Json(update_proposal(&state.db, user.id(), id, patch).await?))
}

/// DELETE /api/v1/proposals/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_proposal(&state.db, user.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/proposals/:id/send
///
/// Records the send and returns the client link. Delivery is up to the caller.
pub async fn handle_send(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SendResponse>, AppError> {
    let proposal = mark_sent(&state.db, user.id(), id).await?;
    let share_url = state.config.share_url(&proposal.share_token);
    Ok(Json(SendResponse {
        proposal,
        share_url,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Public (share link) handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /p/:token
pub async fn handle_public_view(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicProposal>, AppError> {
    Ok(Json(find_by_token(&state.db, &token).await?.into()))
}

/// POST /p/:token/accept
pub async fn handle_public_accept(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<AcceptRequest>,
) -> Result<Json<PublicProposal>, AppError> {
    let row = accept_by_token(&state.db, &token, &request.signature_name).await?;
    Ok(Json(row.into()))
}

/// POST /p/:token/decline
pub async fn handle_public_decline(
    State(state): State<AppState>,
    Path(token): Path<String>,
    request: Option<Json<DeclineRequest>>,
) -> Result<Json<PublicProposal>, AppError> {
    let reason = request.and_then(|Json(r)| r.reason);
    let row = decline_by_token(&state.db, &token, reason).await?;
    Ok(Json(row.into()))
}
