//! Payment creation flow
//!
//! Builds a hosted Stripe checkout session from validated input and persists
//! the initial payment record. The local payment ID is generated before the
//! provider call and embedded in the session metadata, so an orphaned
//! provider session can still be correlated if the local insert fails.

use std::collections::HashMap;

use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentIntentData, Expandable,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::amount::{is_fixed_two_decimal, normalize_amount, Currency};
use crate::client::StripeClient;
use crate::error::{PaymentError, PaymentResult};
use crate::records::{PaymentRecord, PAYMENT_COLUMNS};

/// Status persisted when the provider does not report one on the new session
const DEFAULT_INITIAL_STATUS: &str = "open";

/// Validated input for creating a payment
#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    /// Fixed two-decimal amount string, e.g. "10.00"
    pub amount: String,
    pub currency: Currency,
    pub description: String,
    /// Free-form key/value map carried through to the provider. Values are
    /// coerced to strings; the `payment_id` and `user_id` keys are reserved.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Service for creating payments via hosted checkout
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a provider checkout session and persist the initial record.
    ///
    /// Validation and configuration failures are detected before the
    /// provider call; provider failures are mapped to a typed error with the
    /// underlying cause logged server-side only.
    pub async fn create_payment(
        &self,
        input: CreatePaymentInput,
        owner_id: Uuid,
    ) -> PaymentResult<PaymentRecord> {
        if !is_fixed_two_decimal(&input.amount) {
            return Err(PaymentError::Validation(format!(
                "amount must be a fixed two-decimal string, got {:?}",
                input.amount
            )));
        }
        if input.description.trim().is_empty() {
            return Err(PaymentError::Validation(
                "description must not be empty".to_string(),
            ));
        }

        let config = self.stripe.config();
        if config.secret_key.is_empty() {
            return Err(PaymentError::ConfigMissing("STRIPE_SECRET_KEY"));
        }
        if config.app_base_url.is_empty() {
            return Err(PaymentError::ConfigMissing("APP_BASE_URL"));
        }

        let unit_amount = normalize_amount(&input.amount)?;

        // Generated before the provider call so the session metadata can
        // carry it even if the local insert later fails.
        let payment_id = Uuid::new_v4();
        let metadata = build_provider_metadata(input.metadata.as_ref(), payment_id, owner_id);

        let success_url = checkout_return_url(&config.app_base_url, "success");
        let cancel_url = checkout_return_url(&config.app_base_url, "cancel");

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: input.currency.stripe_currency(),
                unit_amount: Some(unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: input.description.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        params.metadata = Some(metadata.clone());
        // Mirror the metadata onto the payment intent so intent-keyed
        // webhook events can be correlated without a session fetch.
        params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
            metadata: Some(metadata.clone()),
            ..Default::default()
        });

        let session = match CheckoutSession::create(self.stripe.inner(), params).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    owner_id = %owner_id,
                    payment_id = %payment_id,
                    error = %e,
                    "Failed to create checkout session"
                );
                return Err(PaymentError::Provider(
                    "failed to create checkout session".to_string(),
                ));
            }
        };

        let session_id = session.id.to_string();
        let intent_id = session.payment_intent.as_ref().map(|pi| match pi {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(intent) => intent.id.to_string(),
        });
        let status = session
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_INITIAL_STATUS.to_string());
        let expires_at = OffsetDateTime::from_unix_timestamp(session.expires_at).ok();

        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            INSERT INTO payments (
                id, owner_id, stripe_session_id, stripe_payment_intent_id,
                checkout_url, amount, currency, description, status, metadata,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(owner_id)
        .bind(&session_id)
        .bind(&intent_id)
        .bind(session.url.as_ref())
        .bind(&input.amount)
        .bind(input.currency.as_str())
        .bind(input.description.trim())
        .bind(&status)
        .bind(serde_json::to_value(&metadata).ok())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            payment_id = %payment_id,
            owner_id = %owner_id,
            session_id = %session_id,
            amount = %input.amount,
            currency = %input.currency,
            status = %record.status,
            "Payment created"
        );

        Ok(record)
    }
}

/// Build the string metadata sent to the provider.
///
/// Caller values are coerced to strings (the provider metadata interface
/// only accepts strings); the system `payment_id` and `user_id` keys always
/// overwrite caller-supplied values.
pub(crate) fn build_provider_metadata(
    extra: Option<&serde_json::Map<String, serde_json::Value>>,
    payment_id: Uuid,
    owner_id: Uuid,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    if let Some(extra) = extra {
        for (key, value) in extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            metadata.insert(key.clone(), value);
        }
    }

    metadata.insert("payment_id".to_string(), payment_id.to_string());
    metadata.insert("user_id".to_string(), owner_id.to_string());
    metadata
}

/// Redirect URL the provider sends the customer back to. The session ID is
/// embedded as a query parameter via the provider's template placeholder.
pub(crate) fn checkout_return_url(app_base_url: &str, outcome: &str) -> String {
    format!(
        "{}/payments/{}?session_id={{CHECKOUT_SESSION_ID}}",
        app_base_url.trim_end_matches('/'),
        outcome
    )
}
