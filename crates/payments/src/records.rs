//! Payment record storage
//!
//! One row per payment attempt. Rows are inserted by the checkout flow,
//! mutated only by reconciliation, and never deleted.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::PaymentResult;

/// Columns returned for every payment query, kept in one place so inserts,
/// lookups and the reconciliation update stay in sync.
pub(crate) const PAYMENT_COLUMNS: &str = "\
    id, owner_id, stripe_session_id, stripe_payment_intent_id, checkout_url, \
    amount, currency, description, status, metadata, \
    created_at, updated_at, paid_at, failed_at, expires_at";

/// A local payment record mirroring provider state
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub stripe_session_id: String,
    /// Assigned once the provider creates a payment intent for the session
    pub stripe_payment_intent_id: Option<String>,
    pub checkout_url: Option<String>,
    /// Fixed two-decimal amount string, e.g. "10.00"
    pub amount: String,
    pub currency: String,
    pub description: String,
    /// Open provider status vocabulary ("open", "processing", "succeeded",
    /// "canceled", ...). Not a closed local enum: the record mirrors
    /// whatever the provider reports.
    pub status: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub paid_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Filter for owner-scoped listing
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Read-side access to payment records
#[derive(Clone)]
pub struct PaymentStore {
    pool: PgPool,
}

impl PaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> PaymentResult<Option<PaymentRecord>> {
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>> {
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE stripe_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_intent_id(
        &self,
        intent_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>> {
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE stripe_payment_intent_id = $1"
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// List payments owned by `owner_id`, newest first
    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
        filter: &ListFilter,
    ) -> PaymentResult<Vec<PaymentRecord>> {
        let records = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE owner_id = $1
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(owner_id)
        .bind(filter.status.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Payments still in a non-terminal status whose last reconciliation is
    /// older than `stale_after_minutes`. Used by the background sweep to
    /// recover missed webhook deliveries.
    pub async fn list_stale(
        &self,
        stale_after_minutes: i32,
        limit: i64,
    ) -> PaymentResult<Vec<PaymentRecord>> {
        let records = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE status NOT IN ('succeeded', 'canceled', 'expired')
              AND updated_at < NOW() - ($1 || ' minutes')::INTERVAL
            ORDER BY updated_at ASC
            LIMIT $2
            "#
        ))
        .bind(stale_after_minutes)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
