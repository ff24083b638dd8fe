use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    /// Public origin used for share links and Stripe redirect URLs.
    pub app_base_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Credits granted to a user the first time they are seen.
    pub free_credits: i32,
    pub max_photo_bytes: usize,
    pub max_photos_per_job: i64,
    pub enable_rekognition: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_region: optional_env("AWS_REGION", "us-east-1"),
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            stripe_secret_key: require_env("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            app_base_url: optional_env("APP_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            port: optional_env("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
            free_credits: optional_env("FREE_CREDITS", "3")
                .parse::<i32>()
                .context("FREE_CREDITS must be an integer")?,
            max_photo_bytes: optional_env("MAX_PHOTO_BYTES", "5242880")
                .parse::<usize>()
                .context("MAX_PHOTO_BYTES must be a byte count")?,
            max_photos_per_job: optional_env("MAX_PHOTOS_PER_JOB", "30")
                .parse::<i64>()
                .context("MAX_PHOTOS_PER_JOB must be an integer")?,
            enable_rekognition: parse_flag(&optional_env("ENABLE_REKOGNITION", "false")),
        })
    }

    /// Public link a client uses to view and sign a proposal.
    pub fn share_url(&self, share_token: &str) -> String {
        format!("{}/p/{}", self.app_base_url, share_token)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_accepts_common_truthy_values() {
        for v in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(v), "{v} should be truthy");
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!parse_flag(v), "{v} should be falsy");
        }
    }
}
