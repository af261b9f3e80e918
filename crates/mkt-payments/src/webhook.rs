//! Webhook signature verification.
//!
//! Processors notify the application of asynchronous payment outcomes via
//! signed webhooks. The signature header is the processor-standard shape
//! `t=<unix-seconds>,v1=<hex-hmac>[,v1=<hex-hmac>...]` where each `v1` value
//! is HMAC-SHA256 over the signed payload `"{t}.{raw body}"` keyed by the
//! endpoint secret. Multiple `v1` entries appear during secret rotation; the
//! payload verifies if **any** of them matches.
//!
//! Verification uses `Mac::verify_slice`, which compares in constant time.
//! The timestamp is checked against a caller-supplied tolerance to bound
//! replay of captured deliveries.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// WebhookEvent
// ---------------------------------------------------------------------------

/// A decoded webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Processor-side creation time, unix seconds.
    pub created: i64,
    /// Event payload (intent/transfer/refund object).
    pub data: Value,
}

// ---------------------------------------------------------------------------
// WebhookError
// ---------------------------------------------------------------------------

/// Reasons a webhook delivery is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// The signature header is missing a `t=` or `v1=` element.
    MalformedHeader,
    /// The `t=` element is not a valid unix timestamp.
    BadTimestamp,
    /// The timestamp is outside the allowed tolerance window.
    StaleTimestamp { age_secs: i64 },
    /// No `v1` candidate matched the computed HMAC.
    SignatureMismatch,
    /// The body is not a decodable event payload.
    Payload(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::MalformedHeader => write!(f, "webhook signature header malformed"),
            WebhookError::BadTimestamp => write!(f, "webhook timestamp not parseable"),
            WebhookError::StaleTimestamp { age_secs } => {
                write!(f, "webhook timestamp outside tolerance ({age_secs}s old)")
            }
            WebhookError::SignatureMismatch => write!(f, "webhook signature mismatch"),
            WebhookError::Payload(msg) => write!(f, "webhook payload undecodable: {msg}"),
        }
    }
}

impl std::error::Error for WebhookError {}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a webhook delivery and decode its payload.
///
/// `tolerance` bounds |now − t|; deliveries outside the window are rejected
/// even with a valid signature (replay protection). Pass `now` explicitly so
/// verification stays deterministic under test.
pub fn validate_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<WebhookEvent, WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for element in signature_header.split(',') {
        match element.trim().split_once('=') {
            Some(("t", v)) => {
                timestamp = Some(v.parse().map_err(|_| WebhookError::BadTimestamp)?);
            }
            Some(("v1", v)) => {
                // Undecodable hex is treated as a non-matching candidate, not
                // a hard error: rotation may mix schemes in one header.
                if let Ok(bytes) = hex::decode(v) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let t = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    let age_secs = (now.timestamp() - t).abs();
    if age_secs > tolerance.num_seconds() {
        return Err(WebhookError::StaleTimestamp { age_secs });
    }

    let verified = candidates.iter().any(|candidate| {
        let mut mac = match HmacSha256::new_from_slice(secret) {
            Ok(m) => m,
            Err(_) => return false,
        };
        mac.update(t.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(candidate).is_ok()
    });

    if !verified {
        return Err(WebhookError::SignatureMismatch);
    }

    serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
