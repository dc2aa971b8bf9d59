//! Status reconciliation engine
//!
//! Re-derives a payment's local state from a fresh provider fetch and
//! overwrites the stored record. Because every call queries authoritative
//! current state instead of trusting event payloads or delivery order, the
//! operation is idempotent and safe under at-least-once webhook delivery:
//! repeated reconciliation of identical provider state yields the same
//! record.

use sqlx::PgPool;
use stripe::{CheckoutSession, Expandable, PaymentIntent};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{PaymentError, PaymentResult};
use crate::records::{PaymentRecord, PAYMENT_COLUMNS};

pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_CANCELED: &str = "canceled";
pub const STATUS_REQUIRES_PAYMENT_METHOD: &str = "requires_payment_method";

/// Identifiers a reconciliation can be keyed by. At least one must be set.
#[derive(Debug, Clone, Default)]
pub struct ReconcileKey {
    pub payment_id: Option<Uuid>,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
}

impl ReconcileKey {
    pub fn by_payment_id(payment_id: Uuid) -> Self {
        Self {
            payment_id: Some(payment_id),
            ..Default::default()
        }
    }

    pub fn by_intent_id(intent_id: impl Into<String>) -> Self {
        Self {
            payment_intent_id: Some(intent_id.into()),
            ..Default::default()
        }
    }

    pub fn by_session_id(session_id: impl Into<String>) -> Self {
        Self {
            checkout_session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.payment_id.is_none()
            && self.payment_intent_id.is_none()
            && self.checkout_session_id.is_none()
    }
}

/// Relevant fields of a fetched checkout session
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionSnapshot {
    pub id: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub url: Option<String>,
    pub payment_intent_id: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

impl SessionSnapshot {
    fn from_session(session: &CheckoutSession) -> Self {
        Self {
            id: session.id.to_string(),
            status: session.status.map(|s| s.as_str().to_string()),
            payment_status: Some(session.payment_status.as_str().to_string()),
            url: session.url.clone(),
            payment_intent_id: session.payment_intent.as_ref().map(|pi| match pi {
                Expandable::Id(id) => id.to_string(),
                Expandable::Object(intent) => intent.id.to_string(),
            }),
            expires_at: OffsetDateTime::from_unix_timestamp(session.expires_at).ok(),
        }
    }
}

/// Relevant fields of a fetched payment intent with its latest charge
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IntentSnapshot {
    pub id: String,
    pub status: String,
    pub created: Option<OffsetDateTime>,
    pub canceled_at: Option<OffsetDateTime>,
    pub latest_charge_created: Option<OffsetDateTime>,
}

impl IntentSnapshot {
    fn from_intent(intent: &PaymentIntent) -> Self {
        let latest_charge_created = intent.latest_charge.as_ref().and_then(|charge| {
            match charge {
                // Only an expanded charge carries its creation time
                Expandable::Object(charge) => {
                    OffsetDateTime::from_unix_timestamp(charge.created).ok()
                }
                Expandable::Id(_) => None,
            }
        });

        Self {
            id: intent.id.to_string(),
            status: intent.status.as_str().to_string(),
            created: OffsetDateTime::from_unix_timestamp(intent.created).ok(),
            canceled_at: intent
                .canceled_at
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()),
            latest_charge_created,
        }
    }
}

/// The state to persist, computed from provider snapshots
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReconcileOutcome {
    pub status: String,
    /// Set only when the intent succeeded; charge creation time when
    /// available, else the intent's creation time.
    pub paid_at: Option<OffsetDateTime>,
    /// Set when the intent is canceled or back to requiring a payment
    /// method. A payment that has never been attempted also sits in
    /// "requires_payment_method", so this stamp conflates "not yet paid"
    /// with "failed"; see the tests pinning that behavior.
    pub failed_at: Option<OffsetDateTime>,
    pub checkout_url: Option<String>,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Compute the persisted state from whatever the provider returned.
///
/// The intent, once it exists, is the more authoritative source than the
/// session, so the status fallback order is: intent status, session payment
/// status, session status, then "requires_payment_method".
pub(crate) fn resolve_outcome(
    session: Option<&SessionSnapshot>,
    intent: Option<&IntentSnapshot>,
    now: OffsetDateTime,
) -> ReconcileOutcome {
    let status = intent
        .map(|i| i.status.clone())
        .or_else(|| session.and_then(|s| s.payment_status.clone()))
        .or_else(|| session.and_then(|s| s.status.clone()))
        .unwrap_or_else(|| STATUS_REQUIRES_PAYMENT_METHOD.to_string());

    let paid_at = intent
        .filter(|i| i.status == STATUS_SUCCEEDED)
        .map(|i| i.latest_charge_created.or(i.created).unwrap_or(now));

    let failed_at = intent
        .filter(|i| i.status == STATUS_CANCELED || i.status == STATUS_REQUIRES_PAYMENT_METHOD)
        .map(|i| i.canceled_at.unwrap_or(now));

    ReconcileOutcome {
        status,
        paid_at,
        failed_at,
        checkout_url: session.and_then(|s| s.url.clone()),
        payment_intent_id: intent
            .map(|i| i.id.clone())
            .or_else(|| session.and_then(|s| s.payment_intent_id.clone())),
        checkout_session_id: session.map(|s| s.id.clone()),
        expires_at: session.and_then(|s| s.expires_at),
    }
}

/// Service reconciling local records against authoritative provider state
#[derive(Clone)]
pub struct ReconcileService {
    stripe: StripeClient,
    pool: PgPool,
}

impl ReconcileService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Fetch current provider state and overwrite the local record.
    ///
    /// Provider-fetch errors and "no row matched" propagate to the caller;
    /// the webhook dispatcher converts them into a retryable 5xx response.
    pub async fn reconcile_status(&self, key: &ReconcileKey) -> PaymentResult<PaymentRecord> {
        if key.is_empty() {
            return Err(PaymentError::MissingReconcileKey);
        }

        let mut session_snapshot = None;
        let mut intent_id = key.payment_intent_id.clone();

        if let Some(session_id) = &key.checkout_session_id {
            let id: stripe::CheckoutSessionId = session_id.parse()?;
            let session = CheckoutSession::retrieve(self.stripe.inner(), &id, &[]).await?;
            let snapshot = SessionSnapshot::from_session(&session);
            // Adopt the session's intent when the caller didn't supply one
            if intent_id.is_none() {
                intent_id = snapshot.payment_intent_id.clone();
            }
            session_snapshot = Some(snapshot);
        }

        let mut intent_snapshot = None;
        if let Some(id) = &intent_id {
            let id: stripe::PaymentIntentId = id.parse()?;
            let intent =
                PaymentIntent::retrieve(self.stripe.inner(), &id, &["latest_charge"]).await?;
            intent_snapshot = Some(IntentSnapshot::from_intent(&intent));
        }

        let outcome = resolve_outcome(
            session_snapshot.as_ref(),
            intent_snapshot.as_ref(),
            OffsetDateTime::now_utc(),
        );

        let record = self.apply_outcome(key, &outcome).await?;

        tracing::info!(
            payment_id = %record.id,
            status = %record.status,
            paid_at = ?record.paid_at,
            failed_at = ?record.failed_at,
            "Payment reconciled"
        );

        Ok(record)
    }

    /// Persist the outcome with a single update keyed by the most specific
    /// identifier the caller supplied.
    ///
    /// Provider-absent fields keep their stored values; `paid_at` and
    /// `failed_at` are first-stamp-wins so replayed reconciliations do not
    /// move timestamps.
    async fn apply_outcome(
        &self,
        key: &ReconcileKey,
        outcome: &ReconcileOutcome,
    ) -> PaymentResult<PaymentRecord> {
        let (where_clause, key_value) = if let Some(payment_id) = key.payment_id {
            ("id = $8::UUID", payment_id.to_string())
        } else if let Some(intent_id) = &key.payment_intent_id {
            ("stripe_payment_intent_id = $8", intent_id.clone())
        } else if let Some(session_id) = &key.checkout_session_id {
            ("stripe_session_id = $8", session_id.clone())
        } else {
            return Err(PaymentError::MissingReconcileKey);
        };

        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            UPDATE payments SET
                status = $1,
                stripe_payment_intent_id = COALESCE($2, stripe_payment_intent_id),
                stripe_session_id = COALESCE($3, stripe_session_id),
                checkout_url = COALESCE($4, checkout_url),
                expires_at = COALESCE($5, expires_at),
                paid_at = COALESCE(paid_at, $6),
                failed_at = COALESCE(failed_at, $7),
                updated_at = NOW()
            WHERE {where_clause}
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(&outcome.status)
        .bind(&outcome.payment_intent_id)
        .bind(&outcome.checkout_session_id)
        .bind(&outcome.checkout_url)
        .bind(outcome.expires_at)
        .bind(outcome.paid_at)
        .bind(outcome.failed_at)
        .bind(&key_value)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or(PaymentError::PaymentNotFound)
    }
}
