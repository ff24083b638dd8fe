use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::billing::stripe::StripeClient;
use crate::config::Config;
use crate::drafting::queue::DraftQueue;
use crate::llm_client::LlmClient;
use crate::vision::PhotoAnalyzer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Backs the draft job queue; the worker opens its own connection from this client.
    pub redis: RedisClient,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Pluggable per-photo analyzer. Default: ClaudePhotoAnalyzer.
    pub photo_analyzer: Arc<dyn PhotoAnalyzer>,
    pub stripe: StripeClient,
    pub drafts: DraftQueue,
}
