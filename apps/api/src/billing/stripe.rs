//! Stripe client: Checkout Session creation and webhook verification.
//!
//! Only the two calls the credit flow needs are wrapped. Everything else about
//! payments (cards, receipts, refunds) stays inside Stripe.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
/// Webhooks older than this are rejected as possible replays.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    #[error("Malformed webhook payload: {0}")]
    Payload(String),
}

/// A created Checkout Session. The client is redirected to `url`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

pub struct CheckoutParams<'a> {
    pub user_id: Uuid,
    pub pack_id: &'a str,
    pub product_name: &'a str,
    pub credits: i32,
    pub amount_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Credits to add after a paid checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditGrant {
    pub user_id: Uuid,
    pub credits: i32,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    error: StripeApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self, StripeError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            secret_key,
        })
    }

    pub async fn create_checkout_session(
        &self,
        params: CheckoutParams<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let user_id = params.user_id.to_string();
        let form = checkout_form(&params, &user_id);

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response.json().await?;
        debug!("Created checkout session {} for user {}", session.id, user_id);
        Ok(session)
    }
}

fn checkout_form(params: &CheckoutParams<'_>, user_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "payment".to_string()),
        ("success_url", params.success_url.clone()),
        ("cancel_url", params.cancel_url.clone()),
        ("client_reference_id", user_id.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", "usd".to_string()),
        (
            "line_items[0][price_data][unit_amount]",
            params.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]",
            params.product_name.to_string(),
        ),
        ("metadata[user_id]", user_id.to_string()),
        ("metadata[credits]", params.credits.to_string()),
        ("metadata[pack]", params.pack_id.to_string()),
    ]
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
///
/// The signed payload is `"{t}.{body}"`, HMAC-SHA256 keyed by the endpoint secret.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => {
                timestamp = Some(
                    v.parse()
                        .map_err(|_| StripeError::Signature("bad timestamp".to_string()))?,
                )
            }
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| StripeError::Signature("missing t".to_string()))?;
    if signatures.is_empty() {
        return Err(StripeError::Signature("missing v1".to_string()));
    }
    if (now_unix - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(StripeError::Signature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| StripeError::Signature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(StripeError::Signature("no matching v1 signature".to_string()))
    }
}

pub fn parse_event(payload: &[u8]) -> Result<StripeEvent, StripeError> {
    serde_json::from_slice(payload).map_err(|e| StripeError::Payload(e.to_string()))
}

/// Extracts the credit grant from a `checkout.session.completed` event.
/// Returns `None` for other event types and for sessions that are not yet paid.
pub fn credit_grant_from_event(event: &StripeEvent) -> Result<Option<CreditGrant>, StripeError> {
    if event.event_type != "checkout.session.completed" {
        return Ok(None);
    }

    let session: CheckoutSessionObject = serde_json::from_value(event.data.object.clone())
        .map_err(|e| StripeError::Payload(e.to_string()))?;

    if session.payment_status.as_deref() != Some("paid") {
        return Ok(None);
    }

    let user_id = session
        .metadata
        .get("user_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| StripeError::Payload("metadata.user_id missing or invalid".to_string()))?;
    let credits = session
        .metadata
        .get("credits")
        .and_then(|v| v.parse::<i32>().ok())
        .filter(|c| *c > 0)
        .ok_or_else(|| StripeError::Payload("metadata.credits missing or invalid".to_string()))?;

    Ok(Some(CreditGrant {
        user_id,
        credits,
        session_id: session.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn sign(payload: &[u8], t: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{t}.").as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"id":"evt_1"}"#;
        let header = format!("t=1700000000,v1={}", sign(body, 1_700_000_000));
        assert!(verify_webhook_signature(body, &header, SECRET, 1_700_000_010).is_ok());
    }

    #[test]
    fn test_any_matching_v1_is_enough() {
        let body = b"{}";
        let header = format!(
            "t=1700000000,v1=deadbeef,v1={},v0=ignored",
            sign(body, 1_700_000_000)
        );
        assert!(verify_webhook_signature(body, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = format!("t=1700000000,v1={}", sign(b"{\"a\":1}", 1_700_000_000));
        let result = verify_webhook_signature(b"{\"a\":2}", &header, SECRET, 1_700_000_000);
        assert!(matches!(result, Err(StripeError::Signature(_))));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"{}";
        let header = format!("t=1700000000,v1={}", sign(body, 1_700_000_000));
        let later = 1_700_000_000 + WEBHOOK_TOLERANCE_SECS + 1;
        assert!(verify_webhook_signature(body, &header, SECRET, later).is_err());
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(verify_webhook_signature(b"{}", "v1=abc", SECRET, 0).is_err());
        assert!(verify_webhook_signature(b"{}", "t=0", SECRET, 0).is_err());
        assert!(verify_webhook_signature(b"{}", "t=abc,v1=00", SECRET, 0).is_err());
    }

    fn checkout_event(payment_status: &str, metadata: Value) -> StripeEvent {
        serde_json::from_value(serde_json::json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_status": payment_status,
                "metadata": metadata
            }}
        }))
        .unwrap()
    }

    #[test]
    fn test_paid_checkout_yields_grant() {
        let user_id = Uuid::new_v4();
        let event = checkout_event(
            "paid",
            serde_json::json!({"user_id": user_id.to_string(), "credits": "5", "pack": "five"}),
        );
        let grant = credit_grant_from_event(&event).unwrap().unwrap();
        assert_eq!(
            grant,
            CreditGrant {
                user_id,
                credits: 5,
                session_id: "cs_test_1".to_string()
            }
        );
    }

    #[test]
    fn test_unpaid_checkout_yields_nothing() {
        let event = checkout_event(
            "unpaid",
            serde_json::json!({"user_id": Uuid::new_v4().to_string(), "credits": "5"}),
        );
        assert!(credit_grant_from_event(&event).unwrap().is_none());
    }

    #[test]
    fn test_bad_metadata_is_payload_error() {
        let event = checkout_event("paid", serde_json::json!({"user_id": "nope", "credits": "5"}));
        assert!(matches!(
            credit_grant_from_event(&event),
            Err(StripeError::Payload(_))
        ));
    }

    #[test]
    fn test_other_event_types_ignored() {
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_9",
            "type": "invoice.paid",
            "data": { "object": {} }
        }))
        .unwrap();
        assert!(credit_grant_from_event(&event).unwrap().is_none());
    }

    #[test]
    fn test_checkout_form_carries_metadata() {
        let user_id = Uuid::nil();
        let params = CheckoutParams {
            user_id,
            pack_id: "single",
            product_name: "1 proposal credit",
            credits: 1,
            amount_cents: 1500,
            success_url: "https://app/ok".to_string(),
            cancel_url: "https://app/cancel".to_string(),
        };
        let form = checkout_form(&params, &user_id.to_string());
        let get = |k: &str| form.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1500"));
        assert_eq!(get("metadata[credits]"), Some("1"));
        assert_eq!(get("metadata[user_id]"), Some(user_id.to_string().as_str()));
    }
}
