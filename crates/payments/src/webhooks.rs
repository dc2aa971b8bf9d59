//! Stripe webhook handling
//!
//! Verifies inbound signatures over the raw request body, maps event types
//! to reconciliation calls, and appends an audit record for every mutation.
//! Event payloads are used for routing only: the authoritative status is
//! always re-derived from a fresh provider fetch, so replayed or stale
//! payloads that pass the signature check cannot roll state back.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, Webhook};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{PaymentError, PaymentResult};
use crate::records::{PaymentRecord, PaymentStore};
use crate::reconcile::{ReconcileKey, ReconcileService};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed webhook payload
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Audit row recorded for every processed webhook delivery
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub event_type: String,
    /// Local payment status after processing this event
    pub status: String,
    pub created_at: OffsetDateTime,
}

/// Result of dispatching a verified event
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The event was reconciled and audited
    Processed { payment_id: Uuid, status: String },
    /// The event was accepted but deliberately not acted on
    Ignored { reason: &'static str },
}

/// How a given event type is keyed into reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventRoute {
    BySession,
    ByIntent,
    Unhandled,
}

/// Dispatch table for provider event types. Everything outside the handled
/// set is acknowledged without touching the store.
pub(crate) fn classify_event(event_type: &EventType) -> EventRoute {
    match event_type {
        EventType::CheckoutSessionCompleted => EventRoute::BySession,
        EventType::PaymentIntentSucceeded | EventType::PaymentIntentPaymentFailed => {
            EventRoute::ByIntent
        }
        _ => EventRoute::Unhandled,
    }
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    store: PaymentStore,
    reconcile: ReconcileService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let store = PaymentStore::new(pool.clone());
        let reconcile = ReconcileService::new(stripe.clone(), pool.clone());
        Self {
            stripe,
            pool,
            store,
            reconcile,
        }
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Verification runs against the raw request body; a re-serialized body
    /// would not match byte-for-byte and must never be used. Fails closed
    /// when no signing secret is configured.
    pub fn verify_event(&self, payload: &str, signature: &str) -> PaymentResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;
        if webhook_secret.is_empty() {
            return Err(PaymentError::ConfigMissing("STRIPE_WEBHOOK_SECRET"));
        }

        // Standard SDK verification first
        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "SDK webhook verification failed, trying manual verification"
                );
            }
        }

        // Manual verification covers payloads from newer Stripe API versions
        // the SDK's own parser rejects.
        let now = OffsetDateTime::now_utc().unix_timestamp();
        verify_signature(payload, signature, webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse verified webhook payload");
            PaymentError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Dispatch a verified event.
    ///
    /// Unknown event types and unknown payment references are expected noise
    /// and produce `Ignored` outcomes. Handled events reconcile from a fresh
    /// provider fetch and append exactly one audit record; failures on that
    /// path propagate so the caller answers with a retryable error.
    pub async fn handle_event(
        &self,
        event: Event,
        raw_payload: &str,
    ) -> PaymentResult<WebhookOutcome> {
        let event_type = event.type_.to_string();

        match classify_event(&event.type_) {
            EventRoute::BySession => {
                let session = match event.data.object {
                    EventObject::CheckoutSession(session) => session,
                    _ => {
                        return Err(PaymentError::WebhookEventNotSupported(
                            "Expected CheckoutSession".to_string(),
                        ))
                    }
                };
                let session_id = session.id.to_string();

                if self.store.find_by_session_id(&session_id).await?.is_none() {
                    tracing::info!(
                        event_type = %event_type,
                        session_id = %session_id,
                        "Webhook for unknown checkout session - ignoring"
                    );
                    return Ok(WebhookOutcome::Ignored {
                        reason: "payment not found",
                    });
                }

                let record = self
                    .reconcile
                    .reconcile_status(&ReconcileKey::by_session_id(&session_id))
                    .await?;
                self.record_event(&record, &event_type, raw_payload).await?;

                Ok(WebhookOutcome::Processed {
                    payment_id: record.id,
                    status: record.status,
                })
            }
            EventRoute::ByIntent => {
                let intent = match event.data.object {
                    EventObject::PaymentIntent(intent) => intent,
                    _ => {
                        return Err(PaymentError::WebhookEventNotSupported(
                            "Expected PaymentIntent".to_string(),
                        ))
                    }
                };
                let intent_id = intent.id.to_string();

                if self.store.find_by_intent_id(&intent_id).await?.is_none() {
                    tracing::info!(
                        event_type = %event_type,
                        payment_intent_id = %intent_id,
                        "Webhook for unknown payment intent - ignoring"
                    );
                    return Ok(WebhookOutcome::Ignored {
                        reason: "payment not found",
                    });
                }

                let record = self
                    .reconcile
                    .reconcile_status(&ReconcileKey::by_intent_id(&intent_id))
                    .await?;
                self.record_event(&record, &event_type, raw_payload).await?;

                Ok(WebhookOutcome::Processed {
                    payment_id: record.id,
                    status: record.status,
                })
            }
            EventRoute::Unhandled => {
                tracing::info!(
                    event_type = %event_type,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(WebhookOutcome::Ignored {
                    reason: "event type not handled",
                })
            }
        }
    }

    /// Append the audit record for a processed event.
    ///
    /// Every mutating branch must record exactly one row; a failure here
    /// propagates so the provider redelivers the event.
    async fn record_event(
        &self,
        payment: &PaymentRecord,
        event_type: &str,
        raw_payload: &str,
    ) -> PaymentResult<WebhookEventRecord> {
        let payload: serde_json::Value =
            serde_json::from_str(raw_payload).unwrap_or(serde_json::Value::Null);

        let record = sqlx::query_as::<_, WebhookEventRecord>(
            r#"
            INSERT INTO payment_webhook_events (
                id, payment_id, stripe_payment_intent_id, stripe_session_id,
                event_type, status, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, payment_id, stripe_payment_intent_id, stripe_session_id,
                      event_type, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment.id)
        .bind(&payment.stripe_payment_intent_id)
        .bind(&payment.stripe_session_id)
        .bind(event_type)
        .bind(&payment.status)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            webhook_event_id = %record.id,
            payment_id = %payment.id,
            event_type = %event_type,
            status = %payment.status,
            "Webhook event recorded"
        );

        Ok(record)
    }
}

/// Parse a `Stripe-Signature` header: `t=timestamp,v1=signature[,v0=...]`
pub(crate) fn parse_signature_header(signature: &str) -> (Option<i64>, Option<String>) {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0].trim() {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    (timestamp, v1_signature)
}

/// Verify an HMAC-SHA256 webhook signature over the raw payload.
///
/// Rejects payloads whose timestamp is outside the tolerance window to limit
/// replay of captured deliveries.
pub(crate) fn verify_signature(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> PaymentResult<()> {
    let (timestamp, v1_signature) = parse_signature_header(signature);

    let timestamp = timestamp.ok_or_else(|| {
        tracing::error!("Missing timestamp in signature header");
        PaymentError::WebhookSignatureInvalid
    })?;
    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::error!("Missing v1 signature in signature header");
        PaymentError::WebhookSignatureInvalid
    })?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::error!(
            timestamp = timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance"
        );
        return Err(PaymentError::WebhookSignatureInvalid);
    }

    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        PaymentError::WebhookSignatureInvalid
    })?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(PaymentError::WebhookSignatureInvalid);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let secret_key = SECRET.strip_prefix("whsec_").unwrap();
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_parse_signature_header() {
        let (ts, v1) = parse_signature_header("t=1700000000,v1=abc123,v0=legacy");
        assert_eq!(ts, Some(1_700_000_000));
        assert_eq!(v1, Some("abc123".to_string()));

        let (ts, v1) = parse_signature_header("garbage");
        assert_eq!(ts, None);
        assert_eq!(v1, None);
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now);

        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    // A tampered body with an unchanged signature header must be rejected
    // before any business logic runs.
    #[test]
    fn test_tampered_body_rejected() {
        let payload = r#"{"id":"evt_1","amount":1000}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now);

        let tampered = r#"{"id":"evt_1","amount":999999}"#;
        assert!(matches!(
            verify_signature(tampered, &header, SECRET, now),
            Err(PaymentError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let signed_at = 1_700_000_000;
        let header = sign(payload, signed_at);

        let now = signed_at + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(matches!(
            verify_signature(payload, &header, SECRET, now),
            Err(PaymentError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_missing_v1_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        assert!(matches!(
            verify_signature(payload, "t=1700000000", SECRET, 1_700_000_000),
            Err(PaymentError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now);

        assert!(matches!(
            verify_signature(payload, &header, "whsec_other_secret", now),
            Err(PaymentError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_event_dispatch_table() {
        assert_eq!(
            classify_event(&EventType::CheckoutSessionCompleted),
            EventRoute::BySession
        );
        assert_eq!(
            classify_event(&EventType::PaymentIntentSucceeded),
            EventRoute::ByIntent
        );
        assert_eq!(
            classify_event(&EventType::PaymentIntentPaymentFailed),
            EventRoute::ByIntent
        );
        // Everything else is acknowledged without touching the store
        assert_eq!(classify_event(&EventType::InvoicePaid), EventRoute::Unhandled);
        assert_eq!(
            classify_event(&EventType::CustomerCreated),
            EventRoute::Unhandled
        );
    }
}
