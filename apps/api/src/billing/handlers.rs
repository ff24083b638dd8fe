//! Axum route handlers for the Billing API.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::CurrentUser;
use crate::billing::credits::{
    balance, find_pack, grant_credits, recent_transactions, CreditPack, CreditReason,
    CREDIT_PACKS,
};
use crate::billing::stripe::{
    credit_grant_from_event, parse_event, verify_webhook_signature, CheckoutParams, StripeError,
};
use crate::errors::AppError;
use crate::models::billing::CreditTransactionRow;
use crate::state::AppState;

const RECENT_TRANSACTIONS: i64 = 50;

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub balance: i64,
    pub transactions: Vec<CreditTransactionRow>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub pack: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

/// GET /api/v1/billing/packs
pub async fn handle_list_packs() -> Json<&'static [CreditPack]> {
    Json(CREDIT_PACKS)
}

/// GET /api/v1/billing/credits
pub async fn handle_get_credits(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<CreditsResponse>, AppError> {
    let balance = balance(&state.db, user.id()).await?;
    let transactions = recent_transactions(&state.db, user.id(), RECENT_TRANSACTIONS).await?;
    Ok(Json(CreditsResponse {
        balance,
        transactions,
    }))
}

/// POST /api/v1/billing/checkout
///
/// Starts a Stripe Checkout Session for a credit pack. Credits are granted by the
/// webhook once Stripe reports the session as paid, never here.
pub async fn handle_checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let pack = find_pack(request.pack.trim())
        .ok_or_else(|| AppError::Validation(format!("Unknown credit pack '{}'", request.pack)))?;

    let base = &state.config.app_base_url;
    let session = state
        .stripe
        .create_checkout_session(CheckoutParams {
            user_id: user.id(),
            pack_id: pack.id,
            product_name: pack.name,
            credits: pack.credits,
            amount_cents: pack.amount_cents,
            success_url: format!("{base}/billing/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/billing"),
        })
        .await
        .map_err(|e| AppError::Billing(e.to_string()))?;

    let checkout_url = session
        .url
        .ok_or_else(|| AppError::Billing(format!("session {} has no url", session.id)))?;

    info!(
        "Checkout session {} started for user {} (pack {})",
        session.id,
        user.id(),
        pack.id
    );

    Ok(Json(CheckoutResponse {
        checkout_url,
        session_id: session.id,
    }))
}

/// POST /api/v1/billing/webhook
///
/// Stripe calls this unauthenticated; the signature header is the only trust anchor.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;

    verify_webhook_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!("Rejected Stripe webhook: {e}");
        AppError::Validation("Invalid webhook signature".to_string())
    })?;

    let event = parse_event(&body).map_err(|e| AppError::Validation(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    let recorded = sqlx::query(
        "INSERT INTO stripe_events (event_id, event_type) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(&event.id)
    .bind(&event.event_type)
    .execute(&mut *tx)
    .await?;

    if recorded.rows_affected() == 0 {
        info!("Stripe event {} already processed", event.id);
        return Ok(Json(WebhookAck {
            received: true,
            duplicate: true,
        }));
    }

    match credit_grant_from_event(&event) {
        Ok(Some(grant)) => {
            let granted = grant_credits(
                &mut *tx,
                grant.user_id,
                grant.credits,
                CreditReason::Purchase,
                Some(&grant.session_id),
            )
            .await?;
            info!(
                "Checkout {} paid: {} credits for user {} (new entry: {})",
                grant.session_id, grant.credits, grant.user_id, granted
            );
        }
        Ok(None) => {
            info!("Ignoring Stripe event {} ({})", event.id, event.event_type);
        }
        Err(StripeError::Payload(msg)) => {
            return Err(AppError::Validation(format!(
                "Event {} payload rejected: {msg}",
                event.id
            )));
        }
        Err(e) => return Err(AppError::Billing(e.to_string())),
    }

    tx.commit().await?;

    Ok(Json(WebhookAck {
        received: true,
        duplicate: false,
    }))
}
