//! HTTP adapter for a Stripe-shaped payment processor.
//!
//! Implements [`PaymentGateway`] over four REST endpoints:
//!
//! - `POST /v1/payment_intents`                — authorize (manual capture)
//! - `POST /v1/payment_intents/{id}/capture`   — capture into escrow
//! - `POST /v1/transfers`                      — release to provider payout
//! - `POST /v1/refunds`                        — refund to the client
//!
//! Every call forwards the caller's idempotency key in the
//! `Idempotency-Key` header; the processor deduplicates on it, so retrying
//! after an ambiguous failure is safe. Error mapping:
//!
//! - HTTP 402 / `card_error` envelopes -> [`GatewayError::Declined`]
//! - other non-2xx envelopes           -> [`GatewayError::Api`]
//! - connect/send failures             -> [`GatewayError::Transport`]
//! - unparseable bodies                -> [`GatewayError::Decode`]
//!
//! Timeouts are the caller's concern; this adapter only configures a
//! transport-level connect timeout on the underlying client.

use mkt_payments::{
    AuthorizeRequest, ChargeStatus, GatewayError, IdempotencyKey, IntentRef, PaymentGateway,
    RefundRef, TransferRef,
};
use mkt_schemas::Cents;
use serde::Deserialize;
use tracing::debug;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PaymentIntentBody {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RefundBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// RestGateway
// ---------------------------------------------------------------------------

/// Live [`PaymentGateway`] backed by the processor's REST API.
#[derive(Debug, Clone)]
pub struct RestGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl RestGateway {
    pub fn new(secret_key: String) -> Self {
        Self::new_with_base_url(secret_key, "https://api.stripe.com".to_string())
    }

    /// Point the adapter at a different host. Used by tests against a mock
    /// server and by sandbox processor accounts.
    pub fn new_with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            secret_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        key: &IdempotencyKey,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        debug!(%url, key = key.as_str(), "payment gateway request");

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()));
        }

        // Non-2xx: decode the error envelope and classify.
        let envelope: ErrorEnvelope = serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::Decode(format!(
                "http {} with undecodable error body: {e}",
                status.as_u16()
            ))
        })?;
        let err = envelope.error;
        let message = err.message.unwrap_or_else(|| "unknown error".to_string());

        if status.as_u16() == 402 || err.error_type.as_deref() == Some("card_error") {
            Err(GatewayError::Declined {
                code: err.decline_code.or(err.code),
                message,
            })
        } else {
            Err(GatewayError::Api {
                status: Some(status.as_u16()),
                message,
            })
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RestGateway {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn authorize(
        &self,
        req: AuthorizeRequest,
        key: &IdempotencyKey,
    ) -> Result<IntentRef, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), req.amount.raw().to_string()),
            ("currency".to_string(), req.currency.to_lowercase()),
            ("capture_method".to_string(), "manual".to_string()),
        ];
        // Flatten one level of metadata into metadata[...] form fields.
        if let Some(map) = req.metadata.as_object() {
            for (k, v) in map {
                let value = match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                };
                form.push((format!("metadata[{k}]"), value));
            }
        }

        let body: PaymentIntentBody = self.post("/v1/payment_intents", &form, key).await?;
        Ok(IntentRef::new(body.id))
    }

    async fn capture(
        &self,
        intent: &IntentRef,
        key: &IdempotencyKey,
    ) -> Result<ChargeStatus, GatewayError> {
        let path = format!("/v1/payment_intents/{}/capture", intent.as_str());
        let body: PaymentIntentBody = self.post(&path, &[], key).await?;
        Ok(ChargeStatus {
            amount: Cents::new(body.amount),
            currency: body.currency.to_uppercase(),
        })
    }

    async fn release(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        key: &IdempotencyKey,
    ) -> Result<TransferRef, GatewayError> {
        let mut form = vec![("source_transaction".to_string(), intent.as_str().to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.raw().to_string()));
        }
        let body: TransferBody = self.post("/v1/transfers", &form, key).await?;
        Ok(TransferRef::new(body.id))
    }

    async fn refund(
        &self,
        intent: &IntentRef,
        amount: Option<Cents>,
        reason: Option<&str>,
        key: &IdempotencyKey,
    ) -> Result<RefundRef, GatewayError> {
        let mut form = vec![("payment_intent".to_string(), intent.as_str().to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.raw().to_string()));
        }
        if let Some(reason) = reason {
            form.push(("reason".to_string(), reason.to_string()));
        }
        let body: RefundBody = self.post("/v1/refunds", &form, key).await?;
        Ok(RefundRef::new(body.id))
    }
}

// ---------------------------------------------------------------------------
// Tests (mock server, no network)
// ---------------------------------------------------------------------------
