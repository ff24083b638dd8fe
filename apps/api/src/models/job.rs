use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MobileJobRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_name: String,
    pub address: Option<String>,
    pub trade: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub draft: Option<Value>,
    pub draft_error: Option<String>,
    pub draft_attempts: i32,
    pub proposal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPhotoRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub s3_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: String,
    pub findings: Option<Value>,
    pub analysis_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
