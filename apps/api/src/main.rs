mod auth;
mod billing;
mod config;
mod db;
mod drafting;
mod errors;
mod jobs;
mod llm_client;
mod models;
mod proposals;
mod routes;
mod state;
mod storage;
mod vision;

use anyhow::Result;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::billing::stripe::StripeClient;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::drafting::queue::{requeue_interrupted, spawn_draft_worker, DraftQueue};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::vision::claude::ClaudePhotoAnalyzer;
use crate::vision::rekognition::RekognitionLabeler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Proposal API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Initialize Redis (draft queue)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize AWS clients
    let sdk_config = load_aws_config(&config).await;
    let s3 = build_s3_client(&sdk_config, &config);
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Rekognition labels are an optional hint for the vision prompt
    let labeler = if config.enable_rekognition {
        info!("Rekognition label detection enabled");
        Some(RekognitionLabeler::new(
            aws_sdk_rekognition::Client::new(&sdk_config),
            config.s3_bucket.clone(),
        ))
    } else {
        None
    };
    let photo_analyzer = Arc::new(ClaudePhotoAnalyzer::new(llm.clone(), labeler));

    let stripe = StripeClient::new(config.stripe_secret_key.clone())?;
    let drafts = DraftQueue::new(redis.clone());

    // Build app state
    let state = AppState {
        db,
        redis,
        s3,
        llm,
        config: config.clone(),
        photo_analyzer,
        stripe,
        drafts,
    };

    // Drafts interrupted by a restart go back on the queue before the worker starts
    if let Err(e) = requeue_interrupted(&state).await {
        warn!("Could not re-queue interrupted drafts: {e}");
    }
    spawn_draft_worker(state.clone());

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to APP_BASE_URL once the web app domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Shared AWS config with the static credentials from the environment.
async fn load_aws_config(config: &Config) -> SdkConfig {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "proposal-api-static",
    );

    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()))
        .credentials_provider(credentials)
        .load()
        .await
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
fn build_s3_client(sdk_config: &SdkConfig, config: &Config) -> aws_sdk_s3::Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .endpoint_url(&config.s3_endpoint)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
