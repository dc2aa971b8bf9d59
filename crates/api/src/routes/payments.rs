//! Payment endpoints
//!
//! Creation and owner-scoped reads are authenticated; the webhook endpoint
//! is signature-verified instead. All endpoints answer with the uniform
//! success/error envelope.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use paygate_payments::{
    CreatePaymentInput, Currency, ListFilter, PaymentError, WebhookOutcome,
};

use crate::auth::AuthUser;
use crate::error::{success, ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 100;

/// Header carrying the provider's webhook signature
const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    /// Fixed two-decimal amount string, e.g. "10.00"
    pub amount: String,
    pub currency: Currency,
    pub description: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Clamp pagination inputs: limit defaults to 20 and is capped at 100,
/// offset defaults to 0 and is never negative.
pub(crate) fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// POST /payments
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    // Parsed by hand so malformed bodies (unsupported currency, wrong
    // types) get the uniform validation envelope instead of a framework
    // rejection.
    let request: CreatePaymentRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let service = state.payments_service()?;
    let input = CreatePaymentInput {
        amount: request.amount,
        currency: request.currency,
        description: request.description,
        metadata: request.metadata,
    };

    let payment = service.checkout.create_payment(input, user.user_id).await?;

    Ok((StatusCode::CREATED, success(json!({ "payment": payment }))))
}

/// GET /payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListPaymentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let service = state.payments_service()?;
    let (limit, offset) = clamp_page(query.limit, query.offset);

    let filter = ListFilter {
        status: query.status,
        limit,
        offset,
    };
    let payments = service.store.list_for_owner(user.user_id, &filter).await?;

    Ok(success(json!({
        "payments": payments,
        "limit": limit,
        "offset": offset,
    })))
}

/// GET /payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::validation(format!("invalid payment id: {id:?}")))?;

    let service = state.payments_service()?;
    let payment = service
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(ApiError::payment_not_found)?;

    // Only the owner may read a payment record
    if payment.owner_id != user.user_id {
        return Err(ApiError::forbidden("payment belongs to another user"));
    }

    Ok(success(json!({ "payment": payment })))
}

/// POST /payments/webhook
///
/// Unauthenticated; trust comes entirely from signature verification over
/// the raw body. Reconciliation failures propagate as 5xx so the provider
/// retries the delivery; reconciliation is idempotent, so retries are safe.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let service = state.payments_service()?;

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(PaymentError::WebhookSignatureMissing)?;

    let event = service.webhooks.verify_event(&body, signature)?;
    let outcome = service.webhooks.handle_event(event, &body).await?;

    Ok(Json(webhook_response(&outcome)))
}

fn webhook_response(outcome: &WebhookOutcome) -> Value {
    match outcome {
        WebhookOutcome::Processed { .. } => json!({ "status": "ok" }),
        WebhookOutcome::Ignored { reason } => json!({
            "status": "ignored",
            "reason": reason,
        }),
    }
}
