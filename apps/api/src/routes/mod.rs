pub mod health;
pub mod me;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::billing::handlers as billing;
use crate::jobs::handlers as jobs;
use crate::proposals::handlers as proposals;
use crate::state::AppState;

/// Headroom over the photo size cap for multipart boundaries and headers.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let photo_body_limit = state.config.max_photo_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/me", get(me::handle_me))
        // Billing
        .route("/api/v1/billing/packs", get(billing::handle_list_packs))
        .route("/api/v1/billing/credits", get(billing::handle_get_credits))
        .route("/api/v1/billing/checkout", post(billing::handle_checkout))
        .route("/api/v1/billing/webhook", post(billing::handle_webhook))
        // Proposals
        .route(
            "/api/v1/proposals",
            get(proposals::handle_list).post(proposals::handle_create),
        )
        .route(
            "/api/v1/proposals/:id",
            get(proposals::handle_get)
                .patch(proposals::handle_update)
                .delete(proposals::handle_delete),
        )
        .route("/api/v1/proposals/:id/send", post(proposals::handle_send))
        // Mobile jobs
        .route("/api/v1/jobs", get(jobs::handle_list).post(jobs::handle_create))
        .route("/api/v1/jobs/:id", get(jobs::handle_get))
        .route(
            "/api/v1/jobs/:id/photos",
            post(jobs::handle_upload_photo).layer(DefaultBodyLimit::max(photo_body_limit)),
        )
        .route(
            "/api/v1/jobs/:id/photos/:photo_id/retry",
            post(jobs::handle_retry_photo),
        )
        .route(
            "/api/v1/jobs/:id/draft",
            get(jobs::handle_get_draft).post(jobs::handle_start_draft),
        )
        .route("/api/v1/jobs/:id/submit", post(jobs::handle_submit))
        // Public share link
        .route("/p/:token", get(proposals::handle_public_view))
        .route("/p/:token/accept", post(proposals::handle_public_accept))
        .route("/p/:token/decline", post(proposals::handle_public_decline))
        .with_state(state)
}
